pub mod csv_source;
pub mod file;
pub mod stdin;
