//! Data models for the business-management backend.
//!
//! - `User`, `ProfileUpdate`: the authenticated user and partial updates to it
//! - Authentication payloads: `LoginRequest`, `LoginResponse`,
//!   `RegisterRequest`, `ChangePasswordRequest`, refresh-token bodies
//! - Business records: roles and claims, customers, suppliers, products,
//!   purchase orders, and the `ApiResponse` envelope

pub mod auth;
pub mod business;
pub mod user;

pub use auth::{
    ChangePasswordRequest, ForgotPasswordRequest, LoginRequest, LoginResponse,
    RefreshTokenRequest, RefreshTokenResponse, RegisterRequest,
};
pub use business::{
    ApiResponse, Customer, Permission, Product, PurchaseOrder, PurchaseOrderDetail,
    PurchaseOrderStatus, Role, RoleClaim, Supplier, UserClaim,
};
pub use user::{ProfileUpdate, User};
