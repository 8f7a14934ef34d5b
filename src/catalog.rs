//! In-memory product catalog with mutable stock.
//!
//! The catalog is the only state shared between emails. It is owned by the
//! caller and handed to the order processor as `&mut`; everything else reads it.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

/// A catalog entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: String,
    pub name: String,
    pub category: String,
    pub description: String,
    pub season: String,
    pub stock: u32,
}

impl Product {
    /// Text used to embed this product for retrieval.
    pub fn document_text(&self) -> String {
        format!(
            "Product ID: {}\nName: {}\nCategory: {}\nDescription: {}\nSeason: {}",
            self.id, self.name, self.category, self.description, self.season
        )
    }
}

/// Outcome of checking one requested quantity against stock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Created,
    OutOfStock,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::OutOfStock => "out_of_stock",
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when inserting a product whose id is already present.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("duplicate product_id '{0}'")]
pub struct DuplicateProduct(pub String);

/// Products keyed by id, kept in table order.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    products: Vec<Product>,
    by_id: HashMap<String, usize>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a product. The first occurrence of an id wins.
    pub fn insert(&mut self, product: Product) -> Result<(), DuplicateProduct> {
        let key = normalize(&product.id);
        if self.by_id.contains_key(&key) {
            return Err(DuplicateProduct(product.id));
        }
        self.by_id.insert(key, self.products.len());
        self.products.push(product);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.products.len()
    }

    pub fn is_empty(&self) -> bool {
        self.products.is_empty()
    }

    /// Products in table order.
    pub fn products(&self) -> &[Product] {
        &self.products
    }

    /// Look up by product id (case-insensitive).
    pub fn get(&self, id: &str) -> Option<&Product> {
        self.by_id.get(&normalize(id)).map(|&i| &self.products[i])
    }

    /// Look up by exact name (case-insensitive). First match in table order.
    pub fn find_by_name(&self, name: &str) -> Option<&Product> {
        let wanted = normalize(name);
        if wanted.is_empty() {
            return None;
        }
        self.products.iter().find(|p| normalize(&p.name) == wanted)
    }

    /// Resolve a customer reference: id first, then name.
    pub fn resolve(&self, product_id: Option<&str>, name: Option<&str>) -> Option<&Product> {
        product_id
            .and_then(|id| self.get(id))
            .or_else(|| name.and_then(|n| self.get(n).or_else(|| self.find_by_name(n))))
    }

    /// Take `quantity` units of `product_id` out of stock.
    ///
    /// Returns `Created` and decrements stock when enough is on hand; otherwise
    /// returns `OutOfStock` and leaves stock untouched. Unknown ids are out of stock.
    pub fn reserve(&mut self, product_id: &str, quantity: u32) -> OrderStatus {
        let Some(&i) = self.by_id.get(&normalize(product_id)) else {
            return OrderStatus::OutOfStock;
        };
        let product = &mut self.products[i];
        match product.stock.checked_sub(quantity) {
            Some(remaining) => {
                debug!(
                    product_id = %product.id,
                    quantity,
                    before = product.stock,
                    after = remaining,
                    "Stock reserved"
                );
                product.stock = remaining;
                OrderStatus::Created
            }
            None => OrderStatus::OutOfStock,
        }
    }
}

fn normalize(s: &str) -> String {
    s.trim().to_lowercase()
}
