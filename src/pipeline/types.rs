//! Shared types for the email processing pipeline.

use serde::{Deserialize, Serialize};

use crate::catalog::{OrderStatus, Product};

// ── Classification ──────────────────────────────────────────────────

/// The two kinds of customer email we handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmailCategory {
    /// Customer wants to buy something.
    OrderRequest,
    /// Customer is asking about products.
    ProductInquiry,
}

impl EmailCategory {
    pub const ALL: [EmailCategory; 2] = [Self::OrderRequest, Self::ProductInquiry];

    /// Label used in prompts and output tables.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OrderRequest => "order_request",
            Self::ProductInquiry => "product_inquiry",
        }
    }

    /// Match an exact label (case-insensitive). No fuzzy matching.
    pub fn from_label(label: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|c| c.as_str().eq_ignore_ascii_case(label))
    }
}

impl std::fmt::Display for EmailCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One row of the classification table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Classification {
    pub email_id: String,
    pub category: EmailCategory,
}

// ── Orders ──────────────────────────────────────────────────────────

/// One item the customer asked for, as extracted from the email.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestedItem {
    pub product_id: Option<String>,
    pub product_name: Option<String>,
    pub quantity: u32,
}

impl RequestedItem {
    /// The reference to record when the product cannot be resolved.
    pub fn reference(&self) -> &str {
        self.product_id
            .as_deref()
            .or(self.product_name.as_deref())
            .unwrap_or_default()
    }
}

/// One row of the order status table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderLine {
    pub email_id: String,
    pub product_id: String,
    pub quantity: u32,
    pub status: OrderStatus,
}

// ── Inquiries ───────────────────────────────────────────────────────

/// A catalog entry retrieved for an inquiry, with its similarity score.
///
/// `product` is a snapshot taken when the inquiry was handled, so its stock
/// reflects orders processed earlier in the run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RetrievedProduct {
    pub product: Product,
    pub score: f32,
}

// ── Responses ───────────────────────────────────────────────────────

/// A generated reply. Written to the order or inquiry response table by category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Response {
    pub email_id: String,
    pub category: EmailCategory,
    pub text: String,
    /// The model stopped at the token limit.
    #[serde(skip)]
    pub truncated: bool,
}

/// What the response generator needs to know about an email.
#[derive(Debug, Clone)]
pub enum ResponseContext {
    /// Order lines, each paired with the product's display name.
    Order { lines: Vec<(OrderLine, String)> },
    /// Retrieved catalog entries, most similar first. May be empty.
    Inquiry { products: Vec<RetrievedProduct> },
}

impl ResponseContext {
    pub fn category(&self) -> EmailCategory {
        match self {
            Self::Order { .. } => EmailCategory::OrderRequest,
            Self::Inquiry { .. } => EmailCategory::ProductInquiry,
        }
    }
}
