use std::{
    marker::PhantomData,
    sync::{
        Arc, Mutex, PoisonError,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use chrono::Utc;
use sqlx::{FromRow, PgPool, Postgres, postgres::PgRow, query_builder::QueryBuilder};
use uuid::Uuid;

use crate::{
    error::RemoteError,
    models::{Complaint, LostFoundItem, VolunteerRegistration},
    store::Resource,
};

/// ColumnValue
///
/// A typed value bound into a collection query. Column names themselves are
/// always `'static` identifiers owned by the `Resource` impls, never user input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ColumnValue {
    Text(String),
    OptionalText(Option<String>),
    Uuid(Uuid),
}

/// Filter
///
/// Equality filter on one column, used for ownership scoping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Filter {
    pub column: &'static str,
    pub value: ColumnValue,
}

impl Filter {
    pub fn eq(column: &'static str, value: ColumnValue) -> Self {
        Self { column, value }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Order {
    pub column: &'static str,
    pub descending: bool,
}

impl Order {
    pub const fn newest_first() -> Self {
        Self {
            column: "created_at",
            descending: true,
        }
    }
}

/// RemoteCollection Trait
///
/// The uniform shape of one remote relational collection: `select`, `insert`,
/// `update`, `delete`. Ownership rules are *not* enforced here; callers pass
/// the filter they want applied.
///
/// **Send + Sync + async_trait** let the trait object (`Arc<dyn RemoteCollection<T>>`)
/// be shared across tasks and request handlers.
#[async_trait]
pub trait RemoteCollection<T: Resource>: Send + Sync {
    async fn select(&self, filter: Option<Filter>, order: Order) -> Result<Vec<T>, RemoteError>;
    async fn insert(&self, record: T::Insert) -> Result<(), RemoteError>;
    async fn update(&self, id: Uuid, patch: &T::Patch) -> Result<(), RemoteError>;
    async fn delete(&self, id: Uuid) -> Result<(), RemoteError>;
}

pub type CollectionState<T> = Arc<dyn RemoteCollection<T>>;

/// Collections
///
/// One remote collection per entity kind, shared by the stores and the
/// moderation controller.
#[derive(Clone)]
pub struct Collections {
    pub complaints: CollectionState<Complaint>,
    pub lost_found: CollectionState<LostFoundItem>,
    pub volunteers: CollectionState<VolunteerRegistration>,
}

impl Collections {
    pub fn postgres(pool: PgPool) -> Self {
        Self {
            complaints: Arc::new(PostgresCollection::<Complaint>::new(pool.clone())),
            lost_found: Arc::new(PostgresCollection::<LostFoundItem>::new(pool.clone())),
            volunteers: Arc::new(PostgresCollection::<VolunteerRegistration>::new(pool)),
        }
    }
}

// --- Postgres ---

/// PostgresCollection
///
/// `RemoteCollection` backed by one table of the portal database. Queries are
/// assembled with `QueryBuilder` so every value is a bound parameter.
/// The database assigns `id` and `created_at`.
pub struct PostgresCollection<T> {
    pool: PgPool,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Resource> PostgresCollection<T> {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            _marker: PhantomData,
        }
    }
}

fn push_value(builder: &mut QueryBuilder<'_, Postgres>, value: ColumnValue) {
    match value {
        ColumnValue::Text(v) => builder.push_bind(v),
        ColumnValue::OptionalText(v) => builder.push_bind(v),
        ColumnValue::Uuid(v) => builder.push_bind(v),
    };
}

#[async_trait]
impl<T> RemoteCollection<T> for PostgresCollection<T>
where
    T: Resource + for<'r> FromRow<'r, PgRow>,
{
    async fn select(&self, filter: Option<Filter>, order: Order) -> Result<Vec<T>, RemoteError> {
        let mut builder: QueryBuilder<Postgres> =
            QueryBuilder::new(format!("SELECT * FROM {}", T::COLLECTION));

        if let Some(filter) = filter {
            builder.push(format!(" WHERE {} = ", filter.column));
            push_value(&mut builder, filter.value);
        }

        builder.push(format!(
            " ORDER BY {} {}",
            order.column,
            if order.descending { "DESC" } else { "ASC" }
        ));

        match builder.build_query_as::<T>().fetch_all(&self.pool).await {
            Ok(rows) => Ok(rows),
            Err(e) => {
                tracing::error!("select from {} error: {:?}", T::COLLECTION, e);
                Err(e.into())
            }
        }
    }

    async fn insert(&self, record: T::Insert) -> Result<(), RemoteError> {
        let columns = T::insert_columns(&record);
        let names = columns
            .iter()
            .map(|(name, _)| *name)
            .collect::<Vec<_>>()
            .join(", ");

        let mut builder: QueryBuilder<Postgres> =
            QueryBuilder::new(format!("INSERT INTO {} ({}) VALUES (", T::COLLECTION, names));
        let mut values = builder.separated(", ");
        for (_, value) in columns {
            match value {
                ColumnValue::Text(v) => values.push_bind(v),
                ColumnValue::OptionalText(v) => values.push_bind(v),
                ColumnValue::Uuid(v) => values.push_bind(v),
            };
        }
        values.push_unseparated(")");

        builder.build().execute(&self.pool).await.map_err(|e| {
            tracing::error!("insert into {} error: {:?}", T::COLLECTION, e);
            RemoteError::from(e)
        })?;
        Ok(())
    }

    async fn update(&self, id: Uuid, patch: &T::Patch) -> Result<(), RemoteError> {
        let mut builder: QueryBuilder<Postgres> =
            QueryBuilder::new(format!("UPDATE {} SET ", T::COLLECTION));

        for (i, (column, value)) in T::patch_columns(patch).into_iter().enumerate() {
            if i > 0 {
                builder.push(", ");
            }
            builder.push(format!("{column} = "));
            push_value(&mut builder, value);
        }
        builder.push(" WHERE id = ");
        builder.push_bind(id);

        let result = builder.build().execute(&self.pool).await.map_err(|e| {
            tracing::error!("update {} error: {:?}", T::COLLECTION, e);
            RemoteError::from(e)
        })?;

        if result.rows_affected() == 0 {
            return Err(RemoteError::NotFound(id));
        }
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> Result<(), RemoteError> {
        let result = sqlx::query(&format!("DELETE FROM {} WHERE id = $1", T::COLLECTION))
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                tracing::error!("delete from {} error: {:?}", T::COLLECTION, e);
                RemoteError::from(e)
            })?;

        if result.rows_affected() == 0 {
            return Err(RemoteError::NotFound(id));
        }
        Ok(())
    }
}

// --- In-memory ---

/// InMemoryCollection
///
/// A `RemoteCollection` kept in process, used by the tests and local demos.
/// Counts every call, can be told to fail, and can delay `select` to make
/// in-flight races observable. Only `created_at` ordering is supported.
pub struct InMemoryCollection<T> {
    rows: Mutex<Vec<T>>,
    failure: Mutex<Option<String>>,
    select_failure: Mutex<Option<String>>,
    select_delay: Mutex<Option<Duration>>,
    selects: AtomicUsize,
    inserts: AtomicUsize,
    updates: AtomicUsize,
    deletes: AtomicUsize,
}

impl<T: Resource> Default for InMemoryCollection<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Resource> InMemoryCollection<T> {
    pub fn new() -> Self {
        Self {
            rows: Mutex::new(Vec::new()),
            failure: Mutex::new(None),
            select_failure: Mutex::new(None),
            select_delay: Mutex::new(None),
            selects: AtomicUsize::new(0),
            inserts: AtomicUsize::new(0),
            updates: AtomicUsize::new(0),
            deletes: AtomicUsize::new(0),
        }
    }

    pub fn seed(&self, row: T) {
        self.rows.lock().unwrap_or_else(PoisonError::into_inner).push(row);
    }

    pub fn rows(&self) -> Vec<T> {
        self.rows.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Every subsequent call fails with `message` until `recover` is called.
    pub fn fail_with(&self, message: &str) {
        *self.failure.lock().unwrap_or_else(PoisonError::into_inner) = Some(message.to_string());
    }

    /// Only `select` fails; writes keep succeeding.
    pub fn fail_selects_with(&self, message: &str) {
        *self.select_failure.lock().unwrap_or_else(PoisonError::into_inner) =
            Some(message.to_string());
    }

    pub fn recover(&self) {
        *self.failure.lock().unwrap_or_else(PoisonError::into_inner) = None;
        *self.select_failure.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }

    pub fn delay_selects(&self, delay: Duration) {
        *self.select_delay.lock().unwrap_or_else(PoisonError::into_inner) = Some(delay);
    }

    pub fn select_calls(&self) -> usize {
        self.selects.load(Ordering::SeqCst)
    }

    pub fn insert_calls(&self) -> usize {
        self.inserts.load(Ordering::SeqCst)
    }

    pub fn update_calls(&self) -> usize {
        self.updates.load(Ordering::SeqCst)
    }

    pub fn delete_calls(&self) -> usize {
        self.deletes.load(Ordering::SeqCst)
    }

    fn check_failure(&self) -> Result<(), RemoteError> {
        match self
            .failure
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
        {
            Some(message) => Err(RemoteError::Query(message.clone())),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl<T: Resource> RemoteCollection<T> for InMemoryCollection<T> {
    async fn select(&self, filter: Option<Filter>, order: Order) -> Result<Vec<T>, RemoteError> {
        self.selects.fetch_add(1, Ordering::SeqCst);

        let delay = *self.select_delay.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.check_failure()?;
        if let Some(message) = self
            .select_failure
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
        {
            return Err(RemoteError::Query(message));
        }

        let mut rows: Vec<T> = self
            .rows()
            .into_iter()
            .filter(|row| match &filter {
                Some(f) => row.column(f.column).as_ref() == Some(&f.value),
                None => true,
            })
            .collect();

        rows.sort_by_key(|row| row.created_at());
        if order.descending {
            rows.reverse();
        }
        Ok(rows)
    }

    async fn insert(&self, record: T::Insert) -> Result<(), RemoteError> {
        self.inserts.fetch_add(1, Ordering::SeqCst);
        self.check_failure()?;
        self.seed(T::materialize(record, Uuid::new_v4(), Utc::now()));
        Ok(())
    }

    async fn update(&self, id: Uuid, patch: &T::Patch) -> Result<(), RemoteError> {
        self.updates.fetch_add(1, Ordering::SeqCst);
        self.check_failure()?;

        let mut rows = self.rows.lock().unwrap_or_else(PoisonError::into_inner);
        let row = rows
            .iter_mut()
            .find(|row| row.id() == id)
            .ok_or(RemoteError::NotFound(id))?;
        row.apply_patch(patch);
        Ok(())
    }

    async fn delete(&self, id: Uuid) -> Result<(), RemoteError> {
        self.deletes.fetch_add(1, Ordering::SeqCst);
        self.check_failure()?;

        let mut rows = self.rows.lock().unwrap_or_else(PoisonError::into_inner);
        let before = rows.len();
        rows.retain(|row| row.id() != id);
        if rows.len() == before {
            return Err(RemoteError::NotFound(id));
        }
        Ok(())
    }
}

/// InMemoryCollections
///
/// Concrete handles to three in-memory collections, for callers (tests) that
/// need to inspect the rows and call counters behind a `Collections` bundle.
#[derive(Clone, Default)]
pub struct InMemoryCollections {
    pub complaints: Arc<InMemoryCollection<Complaint>>,
    pub lost_found: Arc<InMemoryCollection<LostFoundItem>>,
    pub volunteers: Arc<InMemoryCollection<VolunteerRegistration>>,
}

impl InMemoryCollections {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn collections(&self) -> Collections {
        Collections {
            complaints: self.complaints.clone(),
            lost_found: self.lost_found.clone(),
            volunteers: self.volunteers.clone(),
        }
    }
}
