pub mod docs;
pub mod request;
