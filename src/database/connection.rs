use mongodb::{bson::doc, options::IndexOptions, Client, Database, IndexModel};

use crate::config::AppConfig;
use crate::errors::Result;

pub async fn get_db_client(config: &AppConfig) -> Result<(Client, Database)> {
    let client = Client::with_uri_str(&config.database_url).await?;
    let db = client.database(&config.database_name);

    // Verify database exists by listing collections
    match db.list_collection_names().await {
        Ok(collections) => {
            tracing::info!("✅ Connected to database: {}", config.database_name);
            tracing::info!("📂 Collections found: {:?}", collections);

            if !collections.iter().any(|c| c == "bookings") {
                tracing::warn!("⚠️ 'bookings' collection not found in database");
            }
        }
        Err(e) => {
            tracing::error!(
                "❌ Database '{}' may not exist or is inaccessible: {}",
                config.database_name,
                e
            );
        }
    }

    ensure_sweep_indexes(&db).await;

    Ok((client, db))
}

/// Indexes backing the compliance sweep queries.
async fn ensure_sweep_indexes(db: &Database) {
    let indexes = vec![
        IndexModel::builder()
            .keys(doc! { "status": 1, "createdAt": 1 })
            .options(IndexOptions::builder().name("status_createdAt".to_string()).build())
            .build(),
        IndexModel::builder()
            .keys(doc! { "status": 1, "idProof.uploadedAt": 1 })
            .options(IndexOptions::builder().name("status_idProofUploadedAt".to_string()).build())
            .build(),
        IndexModel::builder()
            .keys(doc! { "checkOut": 1 })
            .options(IndexOptions::builder().name("checkOut".to_string()).build())
            .build(),
        IndexModel::builder()
            .keys(doc! { "hotelId": 1, "createdAt": -1 })
            .options(IndexOptions::builder().name("hotelId_createdAt".to_string()).build())
            .build(),
    ];

    if let Err(e) = db
        .collection::<mongodb::bson::Document>("bookings")
        .create_indexes(indexes)
        .await
    {
        tracing::warn!("Failed to create booking indexes: {}", e);
    }
}
