pub mod handler_extract_file;
