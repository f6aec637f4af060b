//! Catalog lookups.
//!
//! The catalog is read-only from the storefront's perspective; it is seeded
//! with `pizzeria seed` and edited outside this service.

use std::collections::HashMap;

use async_trait::async_trait;
use sqlx::PgPool;

use pizzeria_core::{PizzaId, Price};

use super::RepositoryError;
use crate::models::{Pizza, PizzaFilter, PizzaPage, PricedPizza};

/// Read access to pizzas and their tags.
#[async_trait]
pub trait CatalogRepository: Send + Sync {
    /// One page of pizzas matching `filter`, ordered by id.
    async fn list(&self, filter: &PizzaFilter) -> Result<PizzaPage, RepositoryError>;

    /// Full detail for one pizza.
    async fn get(&self, id: PizzaId) -> Result<Option<Pizza>, RepositoryError>;

    /// Current name and price for each id that exists. Missing ids are absent
    /// from the map.
    async fn price_lookup(
        &self,
        ids: &[PizzaId],
    ) -> Result<HashMap<PizzaId, PricedPizza>, RepositoryError>;

    /// Cheap connectivity check for readiness probes.
    async fn ping(&self) -> Result<(), RepositoryError>;
}

#[derive(sqlx::FromRow)]
struct PizzaRow {
    id: PizzaId,
    name: String,
    description: Option<String>,
    ingredients: Vec<String>,
    price: Price,
    tags: Vec<String>,
}

impl From<PizzaRow> for Pizza {
    fn from(row: PizzaRow) -> Self {
        Self {
            id: row.id,
            name: row.name,
            description: row.description,
            ingredients: row.ingredients,
            price: row.price,
            tags: row.tags,
        }
    }
}

#[derive(sqlx::FromRow)]
struct PricedRow {
    id: PizzaId,
    name: String,
    price: Price,
}

/// Pizzas matching every tag in `$1` (an empty array matches everything).
const TAG_MATCH: &str = r"
    cardinality($1::text[]) = 0
    OR p.id IN (
        SELECT pt.pizza_id
        FROM storefront.pizza_tag pt
        JOIN storefront.tag t ON t.id = pt.tag_id
        WHERE t.name = ANY($1)
        GROUP BY pt.pizza_id
        HAVING COUNT(DISTINCT t.name) = cardinality($1::text[])
    )
";

const PIZZA_COLUMNS: &str = r"
    p.id, p.name, p.description, p.ingredients, p.price,
    COALESCE(
        (SELECT array_agg(t.name ORDER BY t.name)
         FROM storefront.pizza_tag pt
         JOIN storefront.tag t ON t.id = pt.tag_id
         WHERE pt.pizza_id = p.id),
        '{}'
    ) AS tags
";

/// `PostgreSQL` catalog.
#[derive(Clone)]
pub struct PgCatalogRepository {
    pool: PgPool,
}

impl PgCatalogRepository {
    /// Create a new catalog repository.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CatalogRepository for PgCatalogRepository {
    async fn list(&self, filter: &PizzaFilter) -> Result<PizzaPage, RepositoryError> {
        let count_sql = format!("SELECT COUNT(*) FROM storefront.pizza p WHERE {TAG_MATCH}");
        let total: i64 = sqlx::query_scalar(&count_sql)
            .bind(&filter.tags)
            .fetch_one(&self.pool)
            .await?;

        let page_sql = format!(
            "SELECT {PIZZA_COLUMNS} FROM storefront.pizza p WHERE {TAG_MATCH} \
             ORDER BY p.id LIMIT $2 OFFSET $3"
        );
        let rows: Vec<PizzaRow> = sqlx::query_as(&page_sql)
            .bind(&filter.tags)
            .bind(i64::from(filter.limit))
            .bind(i64::from(filter.offset))
            .fetch_all(&self.pool)
            .await?;

        let total = u64::try_from(total)
            .map_err(|_| RepositoryError::DataCorruption(format!("negative count: {total}")))?;

        Ok(PizzaPage {
            total,
            pizzas: rows.into_iter().map(Pizza::from).collect(),
        })
    }

    async fn get(&self, id: PizzaId) -> Result<Option<Pizza>, RepositoryError> {
        let sql = format!("SELECT {PIZZA_COLUMNS} FROM storefront.pizza p WHERE p.id = $1");
        let row: Option<PizzaRow> = sqlx::query_as(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(Pizza::from))
    }

    async fn price_lookup(
        &self,
        ids: &[PizzaId],
    ) -> Result<HashMap<PizzaId, PricedPizza>, RepositoryError> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }
        let raw: Vec<i32> = ids.iter().map(PizzaId::as_i32).collect();
        let rows: Vec<PricedRow> = sqlx::query_as(
            r"
            SELECT id, name, price
            FROM storefront.pizza
            WHERE id = ANY($1)
            ",
        )
        .bind(&raw)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|r| {
                (
                    r.id,
                    PricedPizza {
                        id: r.id,
                        name: r.name,
                        price: r.price,
                    },
                )
            })
            .collect())
    }

    async fn ping(&self) -> Result<(), RepositoryError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
