//! Catalog aggregates: categories, products and their stem variants

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

use crate::domain::value_objects::{Money, ValueError};
use crate::{Error, Result};

#[derive(Clone, Debug, PartialEq, Serialize, sqlx::FromRow)]
pub struct Category {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    pub image_url: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Serialize, sqlx::FromRow)]
pub struct Product {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    pub price: Money,
    pub category_id: Option<Uuid>,
    pub image_url: Vec<String>,
    pub has_stems: bool,
    pub is_message_card: bool,
    pub is_flowers: bool,
    pub is_add_on: bool,
    pub stock_quantity: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    #[sqlx(skip)]
    pub stems: Vec<ProductStem>,
}

#[derive(Clone, Debug, PartialEq, Serialize, sqlx::FromRow)]
pub struct ProductStem {
    pub id: Uuid,
    pub product_id: Uuid,
    pub stem_count: i32,
    pub price: Money,
    pub created_at: DateTime<Utc>,
}

impl Product {
    /// The product's own stem variant with `stem_id`.
    pub fn stem(&self, stem_id: Uuid) -> Option<&ProductStem> { self.stems.iter().find(|s| s.id == stem_id) }
}

// =============================================================================
// Write models
// =============================================================================

#[derive(Clone, Debug, Deserialize, Validate)]
pub struct NewCategory {
    #[validate(length(min = 1, max = 255))]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub image_url: Vec<String>,
}

#[derive(Clone, Debug, Default, Deserialize, Validate)]
pub struct UpdateCategory {
    #[validate(length(min = 1, max = 255))]
    pub name: Option<String>,
    pub description: Option<String>,
    pub image_url: Option<Vec<String>>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct NewStem {
    pub stem_count: i32,
    pub price: Money,
}

#[derive(Clone, Debug, Deserialize, Validate)]
pub struct NewProduct {
    #[validate(length(min = 1, max = 255))]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub price: Money,
    pub category_id: Option<Uuid>,
    #[serde(default)]
    pub image_url: Vec<String>,
    #[serde(default)]
    pub has_stems: bool,
    #[serde(default)]
    pub is_message_card: bool,
    #[serde(default)]
    pub is_flowers: bool,
    #[serde(default)]
    pub is_add_on: bool,
    #[validate(range(min = 0))]
    #[serde(default)]
    pub stock_quantity: i32,
    #[serde(default)]
    pub stems: Vec<NewStem>,
}

impl NewProduct {
    /// Enforces the stem rules and derives the base price from the first stem.
    pub fn normalize(mut self) -> Result<Self> {
        if self.has_stems {
            let first = self
                .stems
                .first()
                .ok_or_else(|| Error::invalid_argument("a product with stems needs at least one stem"))?;
            self.price = first.price;
        } else if !self.stems.is_empty() {
            return Err(Error::invalid_argument("stems given for a product without has_stems"));
        }
        check_prices(self.price, &self.stems)?;
        Ok(self)
    }
}

#[derive(Clone, Debug, Default, Deserialize, Validate)]
pub struct UpdateProduct {
    #[validate(length(min = 1, max = 255))]
    pub name: Option<String>,
    pub description: Option<String>,
    pub price: Option<Money>,
    pub category_id: Option<Uuid>,
    pub image_url: Option<Vec<String>>,
    pub has_stems: Option<bool>,
    pub is_message_card: Option<bool>,
    pub is_flowers: Option<bool>,
    pub is_add_on: Option<bool>,
    #[validate(range(min = 0))]
    pub stock_quantity: Option<i32>,
    /// When present, replaces every existing stem.
    pub stems: Option<Vec<NewStem>>,
}

impl UpdateProduct {
    pub fn normalize(mut self) -> Result<Self> {
        if let Some(first) = self.stems.as_ref().and_then(|stems| stems.first()) {
            self.price = Some(first.price);
        }
        if self.has_stems == Some(true) && self.stems.as_ref().is_some_and(|s| s.is_empty()) {
            return Err(Error::invalid_argument("a product with stems needs at least one stem"));
        }
        check_prices(self.price.unwrap_or_default(), self.stems.as_deref().unwrap_or_default())?;
        Ok(self)
    }

    /// Applies the present fields onto a stored product (stems are handled by the store).
    pub fn apply_to(&self, product: &mut Product) {
        if let Some(v) = &self.name { product.name = v.clone(); }
        if let Some(v) = &self.description { product.description = v.clone(); }
        if let Some(v) = self.price { product.price = v; }
        if let Some(v) = self.category_id { product.category_id = Some(v); }
        if let Some(v) = &self.image_url { product.image_url = v.clone(); }
        if let Some(v) = self.has_stems { product.has_stems = v; }
        if let Some(v) = self.is_message_card { product.is_message_card = v; }
        if let Some(v) = self.is_flowers { product.is_flowers = v; }
        if let Some(v) = self.is_add_on { product.is_add_on = v; }
        if let Some(v) = self.stock_quantity { product.stock_quantity = v; }
    }
}

fn check_prices(price: Money, stems: &[NewStem]) -> Result<()> {
    if stems.iter().any(|s| s.stem_count < 1) {
        return Err(Error::invalid_argument("stem_count must be at least 1"));
    }
    if price.is_negative() || stems.iter().any(|s| s.price.is_negative()) {
        return Err(ValueError::NegativeAmount.into());
    }
    Ok(())
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct CategoryFilter {
    pub search: Option<String>,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct ProductFilter {
    pub search: Option<String>,
    pub category_id: Option<Uuid>,
    pub price_from: Option<Money>,
    pub price_to: Option<Money>,
    pub is_message_card: Option<bool>,
    pub is_flowers: Option<bool>,
    pub is_add_on: Option<bool>,
}

impl ProductFilter {
    pub fn matches(&self, product: &Product) -> bool {
        self.search.as_deref().map_or(true, |q| contains_ci(&product.name, q) || contains_ci(&product.description, q))
            && self.category_id.map_or(true, |c| product.category_id == Some(c))
            && self.price_from.map_or(true, |p| product.price >= p)
            && self.price_to.map_or(true, |p| product.price <= p)
            && self.is_message_card.map_or(true, |f| product.is_message_card == f)
            && self.is_flowers.map_or(true, |f| product.is_flowers == f)
            && self.is_add_on.map_or(true, |f| product.is_add_on == f)
    }
}

impl CategoryFilter {
    pub fn matches(&self, category: &Category) -> bool {
        self.search.as_deref().map_or(true, |q| contains_ci(&category.name, q) || contains_ci(&category.description, q))
    }
}

/// Case-insensitive substring match, the in-memory counterpart of `ILIKE '%q%'`.
pub fn contains_ci(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;

    fn new_product(has_stems: bool, stems: Vec<NewStem>) -> NewProduct {
        NewProduct {
            name: "Red Roses".into(), description: String::new(), price: Money::new(Decimal::new(50, 0)),
            category_id: None, image_url: vec![], has_stems, is_message_card: false, is_flowers: true,
            is_add_on: false, stock_quantity: 5, stems,
        }
    }

    #[test]
    fn test_first_stem_sets_price() {
        let stems = vec![
            NewStem { stem_count: 6, price: Money::new(Decimal::new(30, 0)) },
            NewStem { stem_count: 12, price: Money::new(Decimal::new(55, 0)) },
        ];
        let product = new_product(true, stems).normalize().unwrap();
        assert_eq!(product.price, Money::new(Decimal::new(30, 0)));
    }

    #[test]
    fn test_has_stems_requires_stems() {
        let err = new_product(true, vec![]).normalize().unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::InvalidArgument);
    }

    #[test]
    fn test_negative_price_rejected() {
        let mut product = new_product(false, vec![]);
        product.price = Money::new(Decimal::new(-1, 0));
        assert!(product.normalize().is_err());
    }

    #[test]
    fn test_update_with_stems_overrides_price() {
        let update = UpdateProduct {
            price: Some(Money::new(Decimal::new(99, 0))),
            stems: Some(vec![NewStem { stem_count: 3, price: Money::new(Decimal::new(15, 0)) }]),
            ..Default::default()
        };
        assert_eq!(update.normalize().unwrap().price, Some(Money::new(Decimal::new(15, 0))));
    }

    #[test]
    fn test_contains_ci() {
        assert!(contains_ci("Sunflower Bouquet", "BOUQ"));
        assert!(!contains_ci("Lilies", "rose"));
    }
}
