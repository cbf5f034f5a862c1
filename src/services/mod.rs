pub mod catalog_merger;
pub mod classifier;
pub mod ingestor;
pub mod m3u_parser;
pub mod validator;
