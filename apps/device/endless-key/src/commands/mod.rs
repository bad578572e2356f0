pub mod import;
pub mod serve;
pub mod url;
