//! In-memory repositories for router and service tests.

#![allow(clippy::unwrap_used)]

use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use pizzeria_core::{Email, OrderId, OrderStatus, PizzaId, Price, UserId, VerificationId};

use super::{AccountRepository, CatalogRepository, OrderRepository, RepositoryError};
use crate::models::{
    Account, AccountCredentials, EmailVerification, NewOrder, NewVerification, Order, Pizza,
    PizzaFilter, PizzaPage, PricedPizza, SessionId,
};

// =============================================================================
// Catalog
// =============================================================================

#[derive(Default)]
pub struct MemoryCatalog {
    pizzas: Mutex<BTreeMap<PizzaId, Pizza>>,
}

impl MemoryCatalog {
    /// Add a pizza and return its id. Ids are assigned in insertion order.
    pub fn insert(&self, name: &str, price: Price, tags: &[&str]) -> PizzaId {
        let mut pizzas = self.pizzas.lock().unwrap();
        let next = i32::try_from(pizzas.len()).unwrap() + 1;
        let id = PizzaId::new(next);
        pizzas.insert(
            id,
            Pizza {
                id,
                name: name.to_string(),
                description: Some(format!("{name}, baked to order")),
                ingredients: vec!["dough".to_string(), "tomato".to_string()],
                price,
                tags: tags.iter().map(|t| (*t).to_string()).collect(),
            },
        );
        id
    }

    pub fn set_price(&self, id: PizzaId, price: Price) {
        if let Some(pizza) = self.pizzas.lock().unwrap().get_mut(&id) {
            pizza.price = price;
        }
    }

    pub fn delete(&self, id: PizzaId) {
        self.pizzas.lock().unwrap().remove(&id);
    }
}

#[async_trait]
impl CatalogRepository for MemoryCatalog {
    async fn list(&self, filter: &PizzaFilter) -> Result<PizzaPage, RepositoryError> {
        let pizzas = self.pizzas.lock().unwrap();
        let matching: Vec<&Pizza> = pizzas
            .values()
            .filter(|pizza| filter.tags.iter().all(|tag| pizza.tags.contains(tag)))
            .collect();

        Ok(PizzaPage {
            total: matching.len() as u64,
            pizzas: matching
                .into_iter()
                .skip(filter.offset as usize)
                .take(filter.limit as usize)
                .cloned()
                .collect(),
        })
    }

    async fn get(&self, id: PizzaId) -> Result<Option<Pizza>, RepositoryError> {
        Ok(self.pizzas.lock().unwrap().get(&id).cloned())
    }

    async fn price_lookup(
        &self,
        ids: &[PizzaId],
    ) -> Result<HashMap<PizzaId, PricedPizza>, RepositoryError> {
        let pizzas = self.pizzas.lock().unwrap();
        Ok(ids
            .iter()
            .filter_map(|id| pizzas.get(id))
            .map(|pizza| {
                (
                    pizza.id,
                    PricedPizza {
                        id: pizza.id,
                        name: pizza.name.clone(),
                        price: pizza.price,
                    },
                )
            })
            .collect())
    }

    async fn ping(&self) -> Result<(), RepositoryError> {
        Ok(())
    }
}

// =============================================================================
// Orders
// =============================================================================

#[derive(Default)]
pub struct MemoryOrders {
    orders: Mutex<Vec<Order>>,
}

impl MemoryOrders {
    pub fn all(&self) -> Vec<Order> {
        self.orders.lock().unwrap().clone()
    }
}

#[async_trait]
impl OrderRepository for MemoryOrders {
    async fn create(&self, order: &NewOrder) -> Result<Order, RepositoryError> {
        let mut orders = self.orders.lock().unwrap();
        let id = OrderId::new(i32::try_from(orders.len()).unwrap() + 1);
        let stored = Order {
            id,
            user_id: order.user_id,
            session_id: Some(order.session_id.clone()),
            status: OrderStatus::Pending,
            total: order.total,
            created_at: order.created_at,
            items: order.items.clone(),
        };
        orders.push(stored.clone());
        Ok(stored)
    }

    async fn list_for_session(
        &self,
        session_id: &SessionId,
    ) -> Result<Vec<Order>, RepositoryError> {
        let mut found: Vec<Order> = self
            .orders
            .lock()
            .unwrap()
            .iter()
            .filter(|order| order.session_id.as_ref() == Some(session_id))
            .cloned()
            .collect();
        found.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(found)
    }

    async fn get_for_session(
        &self,
        id: OrderId,
        session_id: &SessionId,
    ) -> Result<Option<Order>, RepositoryError> {
        Ok(self
            .orders
            .lock()
            .unwrap()
            .iter()
            .find(|order| order.id == id && order.session_id.as_ref() == Some(session_id))
            .cloned())
    }
}

// =============================================================================
// Accounts
// =============================================================================

#[derive(Default)]
struct AccountTables {
    accounts: Vec<AccountCredentials>,
    verifications: Vec<EmailVerification>,
    next_verification: i32,
}

#[derive(Default)]
pub struct MemoryAccounts {
    tables: Mutex<AccountTables>,
}

impl MemoryAccounts {
    /// Outstanding tokens for `user_id`, oldest first.
    pub fn tokens_for(&self, user_id: UserId) -> Vec<String> {
        self.tables
            .lock()
            .unwrap()
            .verifications
            .iter()
            .filter(|v| v.user_id == user_id)
            .map(|v| v.token.clone())
            .collect()
    }
}

#[async_trait]
impl AccountRepository for MemoryAccounts {
    async fn find_by_email(
        &self,
        email: &Email,
    ) -> Result<Option<AccountCredentials>, RepositoryError> {
        Ok(self
            .tables
            .lock()
            .unwrap()
            .accounts
            .iter()
            .find(|creds| creds.account.email == *email)
            .cloned())
    }

    async fn find_by_id(&self, id: UserId) -> Result<Option<Account>, RepositoryError> {
        Ok(self
            .tables
            .lock()
            .unwrap()
            .accounts
            .iter()
            .find(|creds| creds.account.id == id)
            .map(|creds| creds.account.clone()))
    }

    async fn create_with_verification(
        &self,
        email: &Email,
        password_hash: &str,
        verification: &NewVerification,
        now: DateTime<Utc>,
    ) -> Result<Account, RepositoryError> {
        let mut tables = self.tables.lock().unwrap();
        if tables.accounts.iter().any(|c| c.account.email == *email) {
            return Err(RepositoryError::Conflict("email".to_string()));
        }

        let account = Account {
            id: UserId::new(i32::try_from(tables.accounts.len()).unwrap() + 1),
            email: email.clone(),
            verified: false,
            created_at: now,
        };
        tables.accounts.push(AccountCredentials {
            account: account.clone(),
            password_hash: password_hash.to_string(),
        });
        insert_verification(&mut tables, &account, verification, now);
        Ok(account)
    }

    async fn replace_verification(
        &self,
        account: &Account,
        verification: &NewVerification,
        now: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        let mut tables = self.tables.lock().unwrap();
        tables.verifications.retain(|v| v.user_id != account.id);
        insert_verification(&mut tables, account, verification, now);
        Ok(())
    }

    async fn find_verification(
        &self,
        token: &str,
    ) -> Result<Option<EmailVerification>, RepositoryError> {
        Ok(self
            .tables
            .lock()
            .unwrap()
            .verifications
            .iter()
            .find(|v| v.token == token)
            .cloned())
    }

    async fn consume_verification(
        &self,
        verification: &EmailVerification,
    ) -> Result<bool, RepositoryError> {
        let mut tables = self.tables.lock().unwrap();
        let before = tables.verifications.len();
        tables.verifications.retain(|v| v.id != verification.id);
        if tables.verifications.len() == before {
            return Ok(false);
        }
        if let Some(creds) = tables
            .accounts
            .iter_mut()
            .find(|c| c.account.id == verification.user_id)
        {
            creds.account.verified = true;
        }
        Ok(true)
    }

    async fn purge_expired_verifications(
        &self,
        now: DateTime<Utc>,
    ) -> Result<u64, RepositoryError> {
        let mut tables = self.tables.lock().unwrap();
        let before = tables.verifications.len();
        tables.verifications.retain(|v| !v.is_expired(now));
        Ok((before - tables.verifications.len()) as u64)
    }
}

fn insert_verification(
    tables: &mut AccountTables,
    account: &Account,
    verification: &NewVerification,
    now: DateTime<Utc>,
) {
    tables.next_verification += 1;
    tables.verifications.push(EmailVerification {
        id: VerificationId::new(tables.next_verification),
        user_id: account.id,
        email: account.email.clone(),
        token: verification.token.clone(),
        expires_at: verification.expires_at,
        created_at: now,
    });
}
