pub mod request_id;
pub mod secret_policy;
pub mod upstream_auth;
