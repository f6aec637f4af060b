//! Seed the pizza catalog from a YAML file.
//!
//! Pizzas are matched by name, so re-running the command updates prices,
//! descriptions and tags in place instead of duplicating rows.
//!
//! ```yaml
//! pizzas:
//!   - name: Margherita
//!     description: Tomato, mozzarella, basil
//!     ingredients: [tomato, mozzarella, basil]
//!     price: "8.50"
//!     tags: [vegetarian, classic]
//! ```

use std::collections::BTreeSet;
use std::path::Path;

use pizzeria_core::Price;
use pizzeria_storefront::db;
use rust_decimal::Decimal;
use serde::Deserialize;
use sqlx::{PgPool, Postgres, Transaction};
use tracing::{error, info};

use super::database_url;

/// Top-level seed document.
#[derive(Debug, Deserialize)]
pub struct CatalogSeed {
    pub pizzas: Vec<PizzaSeed>,
}

#[derive(Debug, Deserialize)]
pub struct PizzaSeed {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub ingredients: Vec<String>,
    pub price: Decimal,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl PizzaSeed {
    /// Tags as stored: trimmed, lowercase, unique.
    fn normalized_tags(&self) -> Vec<String> {
        self.tags
            .iter()
            .map(|t| t.trim().to_lowercase())
            .filter(|t| !t.is_empty())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }
}

/// Check a parsed document, returning one message per problem.
#[must_use]
pub fn validate(seed: &CatalogSeed) -> Vec<String> {
    let mut errors = Vec::new();
    let mut names = BTreeSet::new();

    for (i, pizza) in seed.pizzas.iter().enumerate() {
        let name = pizza.name.trim();
        if name.is_empty() {
            errors.push(format!("pizza #{}: name is empty", i + 1));
            continue;
        }
        if !names.insert(name.to_lowercase()) {
            errors.push(format!("{name}: duplicate name"));
        }
        if let Err(e) = Price::new(pizza.price) {
            errors.push(format!("{name}: {e}"));
        }
    }

    errors
}

/// Load `file_path` and upsert every pizza in a single transaction.
///
/// # Errors
///
/// Returns an error if the file cannot be read or parsed, validation fails,
/// or any database statement fails (nothing is written in that case).
pub async fn catalog(file_path: &str) -> Result<(), Box<dyn std::error::Error>> {
    let path = Path::new(file_path);
    if !path.exists() {
        return Err(format!("File not found: {file_path}").into());
    }

    info!(path = %file_path, "Loading catalog from file");

    // Read and validate YAML before connecting to database
    let content = tokio::fs::read_to_string(path).await?;
    let seed: CatalogSeed = serde_yaml::from_str(&content)?;

    let errors = validate(&seed);
    if !errors.is_empty() {
        error!("Catalog validation failed:");
        for err in &errors {
            error!("  - {err}");
        }
        return Err(format!("{} validation errors found", errors.len()).into());
    }

    let pool = db::create_pool(&database_url()?).await?;
    info!("Connected to database");

    let count = upsert_all(&pool, &seed).await?;
    info!(pizzas = count, "Seeding complete!");

    Ok(())
}

async fn upsert_all(pool: &PgPool, seed: &CatalogSeed) -> Result<usize, sqlx::Error> {
    let mut tx = pool.begin().await?;
    for pizza in &seed.pizzas {
        upsert_pizza(&mut tx, pizza).await?;
        info!(name = %pizza.name.trim(), "Seeded pizza");
    }
    tx.commit().await?;
    Ok(seed.pizzas.len())
}

async fn upsert_pizza(
    tx: &mut Transaction<'_, Postgres>,
    pizza: &PizzaSeed,
) -> Result<(), sqlx::Error> {
    let id: i32 = sqlx::query_scalar(
        r"
        INSERT INTO storefront.pizza (name, description, ingredients, price)
        VALUES ($1, $2, $3, $4)
        ON CONFLICT (name) DO UPDATE
            SET description = EXCLUDED.description,
                ingredients = EXCLUDED.ingredients,
                price = EXCLUDED.price
        RETURNING id
        ",
    )
    .bind(pizza.name.trim())
    .bind(pizza.description.as_deref())
    .bind(&pizza.ingredients)
    .bind(pizza.price)
    .fetch_one(&mut **tx)
    .await?;

    sqlx::query("DELETE FROM storefront.pizza_tag WHERE pizza_id = $1")
        .bind(id)
        .execute(&mut **tx)
        .await?;

    for tag in pizza.normalized_tags() {
        sqlx::query(
            r"
            WITH t AS (
                INSERT INTO storefront.tag (name) VALUES ($2)
                ON CONFLICT (name) DO UPDATE SET name = EXCLUDED.name
                RETURNING id
            )
            INSERT INTO storefront.pizza_tag (pizza_id, tag_id)
            SELECT $1, id FROM t
            ",
        )
        .bind(id)
        .bind(&tag)
        .execute(&mut **tx)
        .await?;
    }

    Ok(())
}
