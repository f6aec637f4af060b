//! Catalog models.

use serde::Serialize;

use pizzeria_core::{PizzaId, Price};

use super::price_as_number;

/// A pizza as shown in listings and detail pages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Pizza {
    pub id: PizzaId,
    pub name: String,
    pub description: Option<String>,
    pub ingredients: Vec<String>,
    #[serde(serialize_with = "price_as_number")]
    pub price: Price,
    pub tags: Vec<String>,
}

/// The slice of a pizza needed to price a cart line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PricedPizza {
    pub id: PizzaId,
    pub name: String,
    pub price: Price,
}

/// Listing parameters, already validated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PizzaFilter {
    /// Lowercase tag names; a pizza must carry all of them.
    pub tags: Vec<String>,
    pub limit: u32,
    pub offset: u32,
}

/// One page of a listing plus the size of the whole result set.
#[derive(Debug, Clone)]
pub struct PizzaPage {
    pub total: u64,
    pub pizzas: Vec<Pizza>,
}
