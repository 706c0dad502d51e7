// Adapters for the file formats and external models the pipeline talks to

pub mod jsonl_input_adapter;
pub mod jsonl_output_adapter;
pub mod tokenizer_adapter;
