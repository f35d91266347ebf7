//! Business records served by the backend: access control (roles,
//! permissions, claims), partners (customers, suppliers), the product
//! catalog and purchase orders.
//!
//! Timestamps are kept as the strings the backend sends; optional nested
//! records are only present when the endpoint expands them.

use serde::{Deserialize, Serialize};

/// Envelope used by endpoints that wrap their payload.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub message: Option<String>,
    pub errors: Vec<String>,
}

impl<T> ApiResponse<T> {
    /// The message plus any field errors, for display.
    pub fn error_summary(&self) -> String {
        let mut parts: Vec<&str> = Vec::new();
        if let Some(message) = self.message.as_deref().filter(|m| !m.trim().is_empty()) {
            parts.push(message);
        }
        parts.extend(self.errors.iter().map(String::as_str));
        if parts.is_empty() {
            "Request failed".to_string()
        } else {
            parts.join("; ")
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Permission {
    pub id: String,
    pub name: String,
    pub description: String,
    pub resource: String,
    pub action: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Role {
    pub id: String,
    pub name: String,
    pub description: String,
    pub is_active: bool,
    pub permissions: Vec<Permission>,
    pub created_at: Option<String>,
    pub updated_at: Option<String>,
}

impl Role {
    /// Whether any permission grants `action` on `resource` (case-insensitive).
    pub fn allows(&self, resource: &str, action: &str) -> bool {
        self.permissions.iter().any(|p| {
            p.resource.eq_ignore_ascii_case(resource) && p.action.eq_ignore_ascii_case(action)
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UserClaim {
    pub id: String,
    pub user_id: String,
    pub claim_type: String,
    pub claim_value: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RoleClaim {
    pub id: String,
    pub role_id: String,
    pub claim_type: String,
    pub claim_value: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Customer {
    pub id: String,
    pub company_name: String,
    pub contact_name: String,
    pub email: String,
    pub phone: String,
    pub address: String,
    pub city: String,
    pub country: String,
    pub tax_id: String,
    pub is_active: bool,
    pub created_at: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Supplier {
    pub id: String,
    pub company_name: String,
    pub contact_name: String,
    pub email: String,
    pub phone: String,
    pub address: String,
    pub city: String,
    pub country: String,
    pub tax_id: String,
    pub category: String,
    pub is_active: bool,
    pub created_at: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Product {
    pub id: String,
    pub name: String,
    pub description: String,
    pub sku: String,
    pub price: f64,
    pub cost: f64,
    pub category: String,
    pub stock: i64,
    pub min_stock: i64,
    pub supplier_id: String,
    pub supplier: Option<Supplier>,
    pub is_active: bool,
    pub created_at: Option<String>,
}

impl Product {
    /// At or below the reorder threshold.
    pub fn needs_restock(&self) -> bool {
        self.stock <= self.min_stock
    }

    pub fn margin(&self) -> f64 {
        self.price - self.cost
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum PurchaseOrderStatus {
    #[default]
    Pending,
    Approved,
    Received,
    Cancelled,
}

impl PurchaseOrderStatus {
    pub fn is_open(&self) -> bool {
        matches!(self, Self::Pending | Self::Approved)
    }
}

impl std::fmt::Display for PurchaseOrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::Pending => "Pending",
            Self::Approved => "Approved",
            Self::Received => "Received",
            Self::Cancelled => "Cancelled",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PurchaseOrderDetail {
    pub id: String,
    pub purchase_order_id: String,
    pub product_id: String,
    pub product: Option<Product>,
    pub quantity: i64,
    pub unit_price: f64,
    pub total_price: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PurchaseOrder {
    pub id: String,
    pub order_number: String,
    pub supplier_id: String,
    pub supplier: Option<Supplier>,
    pub order_date: Option<String>,
    pub expected_date: Option<String>,
    pub status: PurchaseOrderStatus,
    pub total_amount: f64,
    pub notes: String,
    pub details: Vec<PurchaseOrderDetail>,
    pub created_by: String,
    pub created_at: Option<String>,
}

impl PurchaseOrder {
    /// Sum of the line totals, for checking against `total_amount`.
    pub fn details_total(&self) -> f64 {
        self.details.iter().map(|d| d.total_price).sum()
    }
}
