mod memory;
mod mongo_store;
mod store;

pub use memory::MemoryStore;
pub use store::Store;

use mongodb::{Client, Collection, Database};

use crate::utils::AppError;

const DEFAULT_DB_NAME: &str = "course_registration";

#[derive(Clone)]
pub struct MongoDB {
    client: Client,
    db: Database,
}

impl MongoDB {
    pub async fn new(uri: &str) -> Result<Self, AppError> {
        let mut client_options = mongodb::options::ClientOptions::parse(uri).await?;

        client_options.max_pool_size = Some(20);
        client_options.min_pool_size = Some(2);
        client_options.max_idle_time = Some(std::time::Duration::from_secs(300));
        client_options.connect_timeout = Some(std::time::Duration::from_secs(5));
        client_options.server_selection_timeout = Some(std::time::Duration::from_secs(5));

        let client = Client::with_options(client_options)?;

        let db_name = database_name(uri);
        let db = client.database(db_name);

        // Test connection
        db.list_collection_names().await?;

        let mongodb = Self { client, db };
        mongodb.ensure_indexes().await?;

        Ok(mongodb)
    }

    /// Creates the unique keys the data model relies on. A unique index that
    /// cannot be built (for instance over duplicate data) aborts startup.
    async fn ensure_indexes(&self) -> Result<(), AppError> {
        use mongodb::bson::{doc, Document};
        use mongodb::options::IndexOptions;
        use mongodb::IndexModel;

        log::info!("🔧 Creating database indexes...");

        let unique = || IndexOptions::builder().unique(true).build();
        let unique_sparse = || IndexOptions::builder().unique(true).sparse(true).build();

        let required: Vec<(&str, Document, IndexOptions)> = vec![
            ("users", doc! { "email": 1 }, unique()),
            ("users", doc! { "verification_token": 1 }, unique_sparse()),
            ("users", doc! { "reset_token": 1 }, unique_sparse()),
            ("classes", doc! { "crn": 1 }, unique()),
            ("user_classes", doc! { "user_email": 1, "crn": 1 }, unique()),
        ];

        for (collection_name, keys, options) in required {
            let description = format!("{}({})", collection_name, keys);
            let model = IndexModel::builder().keys(keys).options(options).build();

            self.collection::<Document>(collection_name)
                .create_index(model)
                .await
                .map_err(|e| {
                    log::error!("❌ Unique index {} failed: {}", description, e);
                    AppError::from(e)
                })?;
            log::info!("   ✅ Index ready: {}", description);
        }

        // Lookup speed only
        let by_crn = IndexModel::builder().keys(doc! { "crn": 1 }).build();
        match self
            .collection::<Document>("user_classes")
            .create_index(by_crn)
            .await
        {
            Ok(_) => log::info!("   ✅ Index ready: user_classes(crn)"),
            Err(e) => log::warn!("   ⚠️  Index user_classes(crn) not created: {}", e),
        }

        log::info!("✅ Database indexes ready");

        Ok(())
    }

    pub fn collection<T: Send + Sync>(&self, name: &str) -> Collection<T> {
        self.db.collection(name)
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub fn client(&self) -> &Client {
        &self.client
    }
}

/// Database name is the last path segment of the URI, query string excluded.
fn database_name(uri: &str) -> &str {
    uri.strip_prefix("mongodb+srv://")
        .or_else(|| uri.strip_prefix("mongodb://"))
        .and_then(|rest| rest.split_once('/'))
        .map(|(_, path)| path.split('?').next().unwrap_or(""))
        .filter(|name| !name.is_empty())
        .unwrap_or(DEFAULT_DB_NAME)
}

/// `DATABASE_URL` (or a local replica set) pointed at database `db`.
#[cfg(test)]
pub(crate) fn test_uri(db: &str) -> String {
    dotenv::dotenv().ok();

    let base = std::env::var("DATABASE_URL")
        .unwrap_or_else(|_| "mongodb://localhost:27017/?replicaSet=rs0".to_string());
    with_database(&base, db)
}

#[cfg(test)]
fn with_database(base: &str, db: &str) -> String {
    let (scheme, rest) = base.split_once("://").unwrap_or(("mongodb", base));
    let (hosts, query) = match rest.split_once('/') {
        Some((hosts, path)) => (hosts, path.split_once('?').map(|(_, q)| q)),
        None => match rest.split_once('?') {
            Some((hosts, q)) => (hosts, Some(q)),
            None => (rest, None),
        },
    };

    match query {
        Some(q) => format!("{}://{}/{}?{}", scheme, hosts, db, q),
        None => format!("{}://{}/{}", scheme, hosts, db),
    }
}
