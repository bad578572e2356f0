mod helpers;
mod host;
mod import;
