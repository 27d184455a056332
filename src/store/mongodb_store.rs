use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::TryStreamExt;
use mongodb::bson::spec::BinarySubtype;
use mongodb::bson::{doc, Binary, Bson, Document};
use mongodb::error::{ErrorKind, WriteFailure};
use mongodb::options::{
    ClientOptions, FindOneAndUpdateOptions, FindOptions, IndexOptions, ReturnDocument,
};
use mongodb::{Client, Collection, IndexModel};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::base::{MovieStore, PermissionStore, Store, StoreError, TokenStore, UserStore};
use super::search_terms;
use crate::models::filters::SortDirection;
use crate::models::permission::is_known_permission;
use crate::models::{
    Filters, Metadata, Movie, Password, Permissions, Runtime, Scope, TokenRecord, User,
};
use crate::utils::deadline::Deadline;

const DUPLICATE_KEY: i32 = 11000;

/// The config struct for MongoDB connections.
/// Contains the URI and database name.
#[derive(Deserialize, Serialize, JsonSchema, Debug, Clone)]
pub struct MongoDBConfig {
    pub uri: String,
    pub database: String,
}

/// A concrete `Store` implementation that uses MongoDB.
///
/// Movies and users carry a numeric `_id` drawn from the `counters` collection
/// so ids stay monotonically increasing like a relational sequence. Version
/// checks are single-document `update_one` filters, which MongoDB applies
/// atomically.
pub struct MongoDBStore {
    movies: Collection<MovieDocument>,
    users: Collection<UserDocument>,
    tokens: Collection<TokenDocument>,
    counters: Collection<Document>,
}

/// Document shape for storing movies in MongoDB.
#[derive(Serialize, Deserialize, Clone, Debug)]
struct MovieDocument {
    #[serde(rename = "_id")]
    id: i64,
    #[serde(with = "mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    created_at: DateTime<Utc>,
    title: String,
    year: i32,
    runtime: i32,
    genres: Vec<String>,
    version: i32,
}

/// Document shape for storing users and their granted permission codes.
#[derive(Serialize, Deserialize, Clone, Debug)]
struct UserDocument {
    #[serde(rename = "_id")]
    id: i64,
    #[serde(with = "mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    created_at: DateTime<Utc>,
    name: String,
    email: String,
    /// Lowercased email, carries the unique index.
    email_key: String,
    password_hash: String,
    activated: bool,
    version: i32,
    #[serde(default)]
    permissions: Vec<String>,
}

/// Document shape for storing token hashes.
#[derive(Serialize, Deserialize, Clone, Debug)]
struct TokenDocument {
    hash: Binary,
    user_id: i64,
    #[serde(with = "mongodb::bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    expiry: DateTime<Utc>,
    scope: String,
}

impl MovieDocument {
    fn into_movie(self) -> Movie {
        Movie {
            id: self.id,
            created_at: self.created_at,
            title: self.title,
            year: self.year,
            runtime: Runtime(self.runtime),
            genres: self.genres,
            version: self.version,
        }
    }
}

impl UserDocument {
    fn into_user(self) -> User {
        User {
            id: self.id,
            created_at: self.created_at,
            name: self.name,
            email: self.email,
            password: Password::from_hash(self.password_hash),
            activated: self.activated,
            version: self.version,
        }
    }
}

impl TokenDocument {
    fn from_record(record: &TokenRecord) -> Self {
        TokenDocument {
            hash: hash_binary(&record.hash),
            user_id: record.user_id,
            expiry: record.expiry,
            scope: record.scope.as_str().to_string(),
        }
    }

    fn into_record(self) -> Result<TokenRecord, StoreError> {
        let scope = self.scope.parse::<Scope>().map_err(StoreError::Internal)?;
        Ok(TokenRecord {
            hash: self.hash.bytes,
            user_id: self.user_id,
            expiry: self.expiry,
            scope,
        })
    }
}

fn hash_binary(hash: &[u8]) -> Binary {
    Binary {
        subtype: BinarySubtype::Generic,
        bytes: hash.to_vec(),
    }
}

fn is_duplicate_key(e: &mongodb::error::Error) -> bool {
    matches!(
        *e.kind,
        ErrorKind::Write(WriteFailure::WriteError(ref we)) if we.code == DUPLICATE_KEY
    )
}

fn internal(context: &'static str) -> impl Fn(mongodb::error::Error) -> StoreError {
    move |e| StoreError::Internal(format!("{}: {}", context, e))
}

/// Maps a safelisted sort column onto its document field.
/// Masks the `user:password@` part of a connection string.
fn redacted_uri(uri: &str) -> String {
    let Some((scheme, rest)) = uri.split_once("://") else {
        return uri.to_string();
    };
    let authority_end = rest.find(['/', '?']).unwrap_or(rest.len());
    match rest[..authority_end].rfind('@') {
        Some(at) => format!("{}://***@{}", scheme, &rest[at + 1..]),
        None => uri.to_string(),
    }
}

fn sort_field(column: &str) -> &str {
    match column {
        "id" => "_id",
        other => other,
    }
}

impl MongoDBStore {
    /// Creates a new `MongoDBStore` from the given config.
    /// It initializes client connections and sets up indexes.
    pub async fn new(config: &MongoDBConfig) -> Result<Self, StoreError> {
        info!("Connecting to MongoDB at URI: {}", redacted_uri(&config.uri));

        let mut client_options = ClientOptions::parse(&config.uri)
            .await
            .map_err(internal("Failed to parse MongoDB URI"))?;
        client_options.app_name = Some("moviedb".to_string());

        let client = Client::with_options(client_options)
            .map_err(internal("Failed to create MongoDB client"))?;

        let database = client.database(&config.database);
        let store = Self {
            movies: database.collection::<MovieDocument>("movies"),
            users: database.collection::<UserDocument>("users"),
            tokens: database.collection::<TokenDocument>("tokens"),
            counters: database.collection::<Document>("counters"),
        };
        store.ensure_indexes().await?;

        info!("MongoDB connection established successfully.");
        Ok(store)
    }

    async fn ensure_indexes(&self) -> Result<(), StoreError> {
        // 1) Title text index; "none" disables stemming and stop words.
        let title_text = IndexModel::builder()
            .keys(doc! { "title": "text" })
            .options(
                IndexOptions::builder()
                    .default_language("none".to_string())
                    .build(),
            )
            .build();
        self.movies
            .create_index(title_text, None)
            .await
            .map_err(internal("Failed to create text index on title"))?;

        // 2) Multikey index for genre containment.
        let genres = IndexModel::builder().keys(doc! { "genres": 1 }).build();
        self.movies
            .create_index(genres, None)
            .await
            .map_err(internal("Failed to create index on genres"))?;

        // 3) Unique, case-folded email.
        let email = IndexModel::builder()
            .keys(doc! { "email_key": 1 })
            .options(IndexOptions::builder().unique(true).build())
            .build();
        self.users
            .create_index(email, None)
            .await
            .map_err(internal("Failed to create unique index on email"))?;

        // 4) Unique token hash.
        let hash = IndexModel::builder()
            .keys(doc! { "hash": 1 })
            .options(IndexOptions::builder().unique(true).build())
            .build();
        self.tokens
            .create_index(hash, None)
            .await
            .map_err(internal("Failed to create unique index on token hash"))?;

        // 5) Expired tokens are removed by the server in the background.
        let expiry = IndexModel::builder()
            .keys(doc! { "expiry": 1 })
            .options(
                IndexOptions::builder()
                    .expire_after(Duration::from_secs(0))
                    .build(),
            )
            .build();
        self.tokens
            .create_index(expiry, None)
            .await
            .map_err(internal("Failed to create TTL index on token expiry"))?;

        Ok(())
    }

    /// Next value of the named sequence, starting at 1.
    async fn next_id(&self, sequence: &str) -> Result<i64, StoreError> {
        let options = FindOneAndUpdateOptions::builder()
            .upsert(true)
            .return_document(ReturnDocument::After)
            .build();
        let counter = self
            .counters
            .find_one_and_update(
                doc! { "_id": sequence },
                doc! { "$inc": { "seq": 1_i64 } },
                options,
            )
            .await
            .map_err(internal("Failed to advance id sequence"))?
            .ok_or_else(|| StoreError::Internal("id sequence missing after upsert".to_string()))?;

        counter
            .get_i64("seq")
            .map_err(|e| StoreError::Internal(format!("Malformed id sequence: {}", e)))
    }

    fn movie_filter(title: &str, genres: &[String]) -> Document {
        let mut filter = Document::new();
        let terms = search_terms(title);
        if !terms.is_empty() {
            // Quoting every term makes $text require all of them.
            let search = terms
                .iter()
                .map(|t| format!("\"{}\"", t))
                .collect::<Vec<_>>()
                .join(" ");
            filter.insert("$text", doc! { "$search": search });
        }
        if !genres.is_empty() {
            filter.insert("genres", doc! { "$all": genres.to_vec() });
        }
        filter
    }
}

#[async_trait]
impl MovieStore for MongoDBStore {
    async fn insert_movie(&self, deadline: Deadline, movie: &Movie) -> Result<Movie, StoreError> {
        deadline
            .run(async {
                let document = MovieDocument {
                    id: self.next_id("movies").await?,
                    created_at: Utc::now(),
                    title: movie.title.clone(),
                    year: movie.year,
                    runtime: movie.runtime.minutes(),
                    genres: movie.genres.clone(),
                    version: 1,
                };
                self.movies
                    .insert_one(&document, None)
                    .await
                    .map_err(internal("Failed to insert movie"))?;
                debug!(movie_id = document.id, "Inserted movie document.");
                Ok(document.into_movie())
            })
            .await
    }

    async fn get_movie(&self, deadline: Deadline, id: i64) -> Result<Movie, StoreError> {
        if id < 1 {
            return Err(StoreError::NotFound);
        }
        deadline
            .run(async {
                self.movies
                    .find_one(doc! { "_id": id }, None)
                    .await
                    .map_err(internal("Failed to query movie"))?
                    .map(MovieDocument::into_movie)
                    .ok_or(StoreError::NotFound)
            })
            .await
    }

    async fn update_movie(&self, deadline: Deadline, movie: &Movie) -> Result<i32, StoreError> {
        deadline
            .run(async {
                let result = self
                    .movies
                    .update_one(
                        doc! { "_id": movie.id, "version": movie.version },
                        doc! {
                            "$set": {
                                "title": movie.title.clone(),
                                "year": movie.year,
                                "runtime": movie.runtime.minutes(),
                                "genres": movie.genres.clone(),
                            },
                            "$inc": { "version": 1 },
                        },
                        None,
                    )
                    .await
                    .map_err(internal("Failed to update movie"))?;

                if result.matched_count == 0 {
                    return Err(StoreError::EditConflict);
                }
                Ok(movie.version + 1)
            })
            .await
    }

    async fn delete_movie(&self, deadline: Deadline, id: i64) -> Result<(), StoreError> {
        if id < 1 {
            return Err(StoreError::NotFound);
        }
        deadline
            .run(async {
                let result = self
                    .movies
                    .delete_one(doc! { "_id": id }, None)
                    .await
                    .map_err(internal("Failed to delete movie"))?;
                if result.deleted_count == 0 {
                    return Err(StoreError::NotFound);
                }
                Ok(())
            })
            .await
    }

    async fn list_movies(
        &self,
        deadline: Deadline,
        title: &str,
        genres: &[String],
        filters: &Filters,
    ) -> Result<(Vec<Movie>, Metadata), StoreError> {
        let column = filters
            .sort_column()
            .map_err(|e| StoreError::Internal(e.to_string()))?;
        let direction = match filters.sort_direction() {
            SortDirection::Ascending => 1,
            SortDirection::Descending => -1,
        };
        let mut sort = Document::new();
        sort.insert(sort_field(column), direction);
        if column != "id" {
            sort.insert("_id", 1);
        }
        let filter = Self::movie_filter(title, genres);

        deadline
            .run(async {
                let total = self
                    .movies
                    .count_documents(filter.clone(), None)
                    .await
                    .map_err(internal("Failed to count movies"))?;

                let options = FindOptions::builder()
                    .sort(sort)
                    .skip(filters.offset().max(0) as u64)
                    .limit(filters.limit())
                    .build();
                let mut cursor = self
                    .movies
                    .find(filter, options)
                    .await
                    .map_err(internal("Failed to list movies"))?;

                let mut movies = Vec::new();
                while let Some(document) = cursor
                    .try_next()
                    .await
                    .map_err(internal("Failed to read movie document"))?
                {
                    movies.push(document.into_movie());
                }

                let metadata = Metadata::calculate(total as i64, filters.page, filters.page_size);
                Ok((movies, metadata))
            })
            .await
    }
}

#[async_trait]
impl UserStore for MongoDBStore {
    async fn insert_user(&self, deadline: Deadline, user: &User) -> Result<User, StoreError> {
        deadline
            .run(async {
                let document = UserDocument {
                    id: self.next_id("users").await?,
                    created_at: Utc::now(),
                    name: user.name.clone(),
                    email: user.email.clone(),
                    email_key: user.email.to_lowercase(),
                    password_hash: user.password.hash().to_string(),
                    activated: user.activated,
                    version: 1,
                    permissions: Vec::new(),
                };
                self.users
                    .insert_one(&document, None)
                    .await
                    .map_err(|e| {
                        if is_duplicate_key(&e) {
                            StoreError::DuplicateEmail
                        } else {
                            internal("Failed to insert user")(e)
                        }
                    })?;
                Ok(document.into_user())
            })
            .await
    }

    async fn get_user(&self, deadline: Deadline, id: i64) -> Result<User, StoreError> {
        deadline
            .run(async {
                self.users
                    .find_one(doc! { "_id": id }, None)
                    .await
                    .map_err(internal("Failed to query user"))?
                    .map(UserDocument::into_user)
                    .ok_or(StoreError::NotFound)
            })
            .await
    }

    async fn get_user_by_email(
        &self,
        deadline: Deadline,
        email: &str,
    ) -> Result<User, StoreError> {
        deadline
            .run(async {
                self.users
                    .find_one(doc! { "email_key": email.to_lowercase() }, None)
                    .await
                    .map_err(internal("Failed to query user by email"))?
                    .map(UserDocument::into_user)
                    .ok_or(StoreError::NotFound)
            })
            .await
    }

    async fn update_user(&self, deadline: Deadline, user: &User) -> Result<i32, StoreError> {
        deadline
            .run(async {
                let result = self
                    .users
                    .update_one(
                        doc! { "_id": user.id, "version": user.version },
                        doc! {
                            "$set": {
                                "name": user.name.clone(),
                                "email": user.email.clone(),
                                "email_key": user.email.to_lowercase(),
                                "password_hash": user.password.hash(),
                                "activated": user.activated,
                            },
                            "$inc": { "version": 1 },
                        },
                        None,
                    )
                    .await
                    .map_err(|e| {
                        if is_duplicate_key(&e) {
                            StoreError::DuplicateEmail
                        } else {
                            internal("Failed to update user")(e)
                        }
                    })?;

                if result.matched_count == 0 {
                    return Err(StoreError::EditConflict);
                }
                Ok(user.version + 1)
            })
            .await
    }
}

#[async_trait]
impl TokenStore for MongoDBStore {
    async fn insert_token(
        &self,
        deadline: Deadline,
        token: &TokenRecord,
    ) -> Result<(), StoreError> {
        deadline
            .run(async {
                self.tokens
                    .insert_one(TokenDocument::from_record(token), None)
                    .await
                    .map_err(internal("Failed to insert token"))?;
                Ok(())
            })
            .await
    }

    async fn get_token(
        &self,
        deadline: Deadline,
        hash: &[u8],
        scope: Scope,
    ) -> Result<Option<TokenRecord>, StoreError> {
        deadline
            .run(async {
                let found = self
                    .tokens
                    .find_one(
                        doc! { "hash": hash_binary(hash), "scope": scope.as_str() },
                        None,
                    )
                    .await
                    .map_err(internal("Failed to query token document"))?;
                found.map(TokenDocument::into_record).transpose()
            })
            .await
    }

    async fn delete_tokens_for_user(
        &self,
        deadline: Deadline,
        user_id: i64,
        scope: Scope,
    ) -> Result<(), StoreError> {
        deadline
            .run(async {
                let result = self
                    .tokens
                    .delete_many(doc! { "user_id": user_id, "scope": scope.as_str() }, None)
                    .await
                    .map_err(internal("Failed to delete tokens"))?;
                debug!(
                    user_id,
                    scope = scope.as_str(),
                    deleted = result.deleted_count,
                    "Revoked tokens."
                );
                Ok(())
            })
            .await
    }
}

#[async_trait]
impl PermissionStore for MongoDBStore {
    async fn get_permissions_for_user(
        &self,
        deadline: Deadline,
        user_id: i64,
    ) -> Result<Permissions, StoreError> {
        deadline
            .run(async {
                let user = self
                    .users
                    .find_one(doc! { "_id": user_id }, None)
                    .await
                    .map_err(internal("Failed to query permissions"))?;
                Ok(user
                    .map(|u| Permissions::new(u.permissions))
                    .unwrap_or_default())
            })
            .await
    }

    async fn add_permissions_for_user(
        &self,
        deadline: Deadline,
        user_id: i64,
        codes: &[&str],
    ) -> Result<(), StoreError> {
        let known: Vec<Bson> = codes
            .iter()
            .filter(|c| is_known_permission(c))
            .map(|c| Bson::String(c.to_string()))
            .collect();
        if known.is_empty() {
            return Ok(());
        }
        deadline
            .run(async {
                self.users
                    .update_one(
                        doc! { "_id": user_id },
                        doc! { "$addToSet": { "permissions": { "$each": known } } },
                        None,
                    )
                    .await
                    .map_err(internal("Failed to grant permissions"))?;
                Ok(())
            })
            .await
    }
}

#[async_trait]
impl Store for MongoDBStore {
    fn name(&self) -> &str {
        "mongo"
    }

    async fn migrate(&self) -> Result<(), StoreError> {
        self.ensure_indexes().await
    }
}
