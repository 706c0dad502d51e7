use std::collections::HashMap;
use std::io::BufRead;

use super::{NgramEntry, NgramModel, WordId};

enum Section {
    Preamble,
    Data,
    Ngrams(usize),
    End,
}

/// Parse an ARPA backoff model.
///
/// Entry counts must agree with the `\data\` header, and every word in a
/// higher-order n-gram must appear among the unigrams.
pub fn parse<R: BufRead>(reader: R) -> Result<NgramModel, String> {
    let mut section = Section::Preamble;
    let mut declared: Vec<usize> = Vec::new();
    let mut vocab: HashMap<String, WordId> = HashMap::new();
    let mut tables: Vec<HashMap<Vec<WordId>, NgramEntry>> = Vec::new();

    for (index, line) in reader.lines().enumerate() {
        let line = line.map_err(|e| format!("read error: {}", e))?;
        let line_no = index + 1;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        if trimmed == "\\data\\" {
            section = Section::Data;
            continue;
        }
        if trimmed == "\\end\\" {
            section = Section::End;
            break;
        }
        if let Some(order) = parse_section_header(trimmed) {
            if order == 0 || order > declared.len() {
                return Err(format!("line {}: undeclared section {}", line_no, trimmed));
            }
            if order != tables.len() + 1 {
                return Err(format!("line {}: section {} out of order", line_no, trimmed));
            }
            tables.push(HashMap::with_capacity(declared[order - 1]));
            section = Section::Ngrams(order);
            continue;
        }

        match section {
            Section::Preamble | Section::End => {}
            Section::Data => {
                let (order, count) = parse_count(trimmed)
                    .ok_or_else(|| format!("line {}: bad count line '{}'", line_no, trimmed))?;
                if order != declared.len() + 1 {
                    return Err(format!("line {}: n-gram counts out of order", line_no));
                }
                declared.push(count);
            }
            Section::Ngrams(order) => {
                let mut fields = trimmed.split_whitespace();
                let log_prob = parse_float(fields.next(), line_no)?;
                let words: Vec<&str> = fields.collect();
                let backoff = match words.len() {
                    n if n == order => 0.0,
                    n if n == order + 1 => parse_float(words.last().copied(), line_no)?,
                    _ => {
                        return Err(format!(
                            "line {}: expected {} words in {}-gram entry",
                            line_no, order, order
                        ))
                    }
                };

                let mut key = Vec::with_capacity(order);
                for word in &words[..order] {
                    let id = if order == 1 {
                        let next = vocab.len() as WordId;
                        *vocab.entry((*word).to_string()).or_insert(next)
                    } else {
                        *vocab.get(*word).ok_or_else(|| {
                            format!("line {}: word '{}' missing from unigrams", line_no, word)
                        })?
                    };
                    key.push(id);
                }
                tables[order - 1].insert(key, NgramEntry { log_prob, backoff });
            }
        }
    }

    if !matches!(section, Section::End) {
        return Err("missing \\end\\ marker".to_string());
    }
    if declared.is_empty() {
        return Err("missing \\data\\ header".to_string());
    }
    if tables.len() != declared.len() {
        return Err(format!(
            "header declares {} orders but {} sections were found",
            declared.len(),
            tables.len()
        ));
    }
    for (n, (table, expected)) in tables.iter().zip(&declared).enumerate() {
        if table.len() != *expected {
            return Err(format!(
                "{}-grams: header declares {} entries, found {}",
                n + 1,
                expected,
                table.len()
            ));
        }
    }

    NgramModel::from_tables(vocab, tables)
}

fn parse_section_header(line: &str) -> Option<usize> {
    line.strip_prefix('\\')?
        .strip_suffix("-grams:")?
        .parse()
        .ok()
}

fn parse_count(line: &str) -> Option<(usize, usize)> {
    let rest = line.strip_prefix("ngram")?.trim();
    let (order, count) = rest.split_once('=')?;
    Some((order.trim().parse().ok()?, count.trim().parse().ok()?))
}

fn parse_float(field: Option<&str>, line_no: usize) -> Result<f32, String> {
    let field = field.ok_or_else(|| format!("line {}: empty entry", line_no))?;
    field
        .parse::<f32>()
        .map_err(|_| format!("line {}: '{}' is not a number", line_no, field))
}
