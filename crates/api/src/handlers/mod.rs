pub mod leads;
pub mod models;
pub mod webhooks;
