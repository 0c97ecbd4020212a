pub mod dispatcher;
pub mod registry;
pub mod stream;
pub mod transform;
pub mod upload_service;
pub mod worker;
