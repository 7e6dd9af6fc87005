pub mod handler_file_copy;
