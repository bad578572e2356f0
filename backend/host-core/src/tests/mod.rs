mod import;
mod readiness;
mod supervisor;
mod support;
