//! API request handlers

pub mod grants;
pub mod keys;
pub mod token;

pub use grants::{add_grant, list_grants, revoke_grant, GrantRequest};
pub use keys::{
    authority_key, register_service_key, unregister_service_key, RegisterServiceKeyRequest,
    RegisterServiceKeyResponse, ServiceKeyRequest,
};
pub use token::{issue_role_token, AppState, AuthorityConfig, RoleTokenQuery};
