use std::collections::BTreeSet;
use std::sync::Arc;

use jam_core::ServiceError;
use jam_sql::{Row, SQLError, SQLStore, Statement, Value};
use uuid::Uuid;

use crate::model::{Association, Collection, Company, LIKED_COLLECTION};

/// SQL schema for companies, collections, their associations, and settings.
const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS companies (
    id            INTEGER PRIMARY KEY AUTOINCREMENT,
    company_name  TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS company_collections (
    id               TEXT PRIMARY KEY,
    collection_name  TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS company_collection_associations (
    id             INTEGER PRIMARY KEY AUTOINCREMENT,
    company_id     INTEGER NOT NULL REFERENCES companies(id) ON DELETE CASCADE,
    collection_id  TEXT NOT NULL REFERENCES company_collections(id) ON DELETE CASCADE,
    UNIQUE (company_id, collection_id)
);
CREATE INDEX IF NOT EXISTS idx_assoc_collection ON company_collection_associations(collection_id);
CREATE TABLE IF NOT EXISTS settings (
    setting_name  TEXT PRIMARY KEY
);
";

const INSERT_ASSOCIATION: &str =
    "INSERT INTO company_collection_associations (company_id, collection_id) VALUES (?1, ?2)";

/// Company columns plus `liked`: membership in the liked collection, whose
/// name is bound as `?1`.
const COMPANY_COLUMNS: &str = "c.id AS id, c.company_name AS company_name, \
     EXISTS (SELECT 1 FROM company_collection_associations la \
             JOIN company_collections lc ON lc.id = la.collection_id \
             WHERE la.company_id = c.id AND lc.collection_name = ?1) AS liked";

fn storage(e: SQLError) -> ServiceError {
    ServiceError::Storage(e.to_string())
}

/// Storage for companies, collections, and the association set.
///
/// Every mutation is its own transaction, so a caller looping over items
/// commits them one at a time and a failure loses at most the in-flight one.
pub struct CollectionStore {
    db: Arc<dyn SQLStore>,
}

impl CollectionStore {
    /// Create a new store and initialise the schema.
    pub fn new(db: Arc<dyn SQLStore>) -> Result<Self, ServiceError> {
        for stmt in SCHEMA.split(';').map(str::trim).filter(|s| !s.is_empty()) {
            db.exec(stmt, &[])
                .map_err(|e| ServiceError::Storage(format!("collections schema init: {e}")))?;
        }
        Ok(Self { db })
    }

    /// Run blocking store calls on tokio's blocking pool.
    pub async fn run_blocking<T, F>(self: &Arc<Self>, f: F) -> Result<T, ServiceError>
    where
        F: FnOnce(&CollectionStore) -> Result<T, ServiceError> + Send + 'static,
        T: Send + 'static,
    {
        let store = Arc::clone(self);
        tokio::task::spawn_blocking(move || f(&store))
            .await
            .map_err(|e| ServiceError::Internal(format!("storage call aborted: {e}")))?
    }

    // -----------------------------------------------------------------------
    // Companies
    // -----------------------------------------------------------------------

    pub fn get_company(&self, id: i64) -> Result<Option<Company>, ServiceError> {
        let rows = self
            .db
            .query(
                &format!("SELECT {COMPANY_COLUMNS} FROM companies c WHERE c.id = ?2"),
                &[liked_param(), Value::Integer(id)],
            )
            .map_err(storage)?;
        rows.first().map(row_to_company).transpose()
    }

    /// All companies, ordered by id.
    pub fn list_companies(&self) -> Result<Vec<Company>, ServiceError> {
        let rows = self
            .db
            .query(
                &format!("SELECT {COMPANY_COLUMNS} FROM companies c ORDER BY c.id"),
                &[liked_param()],
            )
            .map_err(storage)?;
        rows.iter().map(row_to_company).collect()
    }

    // -----------------------------------------------------------------------
    // Collections
    // -----------------------------------------------------------------------

    pub fn get_collection(&self, id: Uuid) -> Result<Option<Collection>, ServiceError> {
        let rows = self
            .db
            .query(
                "SELECT id, collection_name FROM company_collections WHERE id = ?1",
                &[Value::Text(id.to_string())],
            )
            .map_err(storage)?;
        rows.first().map(row_to_collection).transpose()
    }

    pub fn list_collections(&self) -> Result<Vec<Collection>, ServiceError> {
        let rows = self
            .db
            .query(
                "SELECT id, collection_name FROM company_collections ORDER BY rowid",
                &[],
            )
            .map_err(storage)?;
        rows.iter().map(row_to_collection).collect()
    }

    /// Member companies of a collection, ordered by company id.
    pub fn collection_companies(&self, collection_id: Uuid) -> Result<Vec<Company>, ServiceError> {
        let rows = self
            .db
            .query(
                &format!(
                    "SELECT {COMPANY_COLUMNS} FROM companies c \
                     JOIN company_collection_associations a ON a.company_id = c.id \
                     WHERE a.collection_id = ?2 ORDER BY c.id"
                ),
                &[liked_param(), Value::Text(collection_id.to_string())],
            )
            .map_err(storage)?;
        rows.iter().map(row_to_company).collect()
    }

    /// Replace every company, collection, and association in one
    /// transaction, recording `setting` in the same commit.
    ///
    /// Company ids restart at 1. Each `(name, n)` in `collections` becomes a
    /// collection holding the first `n` companies by id.
    pub fn replace_all(
        &self,
        company_names: &[String],
        collections: &[(&str, usize)],
        setting: &str,
    ) -> Result<Vec<Collection>, ServiceError> {
        let mut statements = vec![
            Statement::new("DELETE FROM company_collection_associations", vec![]),
            Statement::new("DELETE FROM company_collections", vec![]),
            Statement::new("DELETE FROM companies", vec![]),
            Statement::new(
                "DELETE FROM sqlite_sequence \
                 WHERE name IN ('companies', 'company_collection_associations')",
                vec![],
            ),
        ];
        statements.extend(company_names.iter().map(|name| {
            Statement::new(
                "INSERT INTO companies (company_name) VALUES (?1)",
                vec![Value::Text(name.clone())],
            )
        }));

        let created: Vec<Collection> = collections
            .iter()
            .map(|(name, _)| Collection {
                id: Uuid::new_v4(),
                collection_name: name.to_string(),
            })
            .collect();
        for (collection, (_, members)) in created.iter().zip(collections) {
            let id = Value::Text(collection.id.to_string());
            statements.push(Statement::new(
                "INSERT INTO company_collections (id, collection_name) VALUES (?1, ?2)",
                vec![id.clone(), Value::Text(collection.collection_name.clone())],
            ));
            statements.push(Statement::new(
                "INSERT INTO company_collection_associations (company_id, collection_id) \
                 SELECT id, ?1 FROM companies ORDER BY id LIMIT ?2",
                vec![id, Value::Integer(*members as i64)],
            ));
        }
        statements.push(Statement::new(
            "INSERT OR IGNORE INTO settings (setting_name) VALUES (?1)",
            vec![Value::Text(setting.to_string())],
        ));

        self.db.transaction(&statements).map_err(storage)?;
        Ok(created)
    }

    // -----------------------------------------------------------------------
    // Associations
    // -----------------------------------------------------------------------

    /// Snapshot of company ids currently in a collection.
    pub fn company_ids_in(&self, collection_id: Uuid) -> Result<BTreeSet<i64>, ServiceError> {
        Ok(self
            .associations_in(collection_id)?
            .into_iter()
            .map(|a| a.company_id)
            .collect())
    }

    /// Every association row of a collection, ordered by row id.
    pub fn associations_in(&self, collection_id: Uuid) -> Result<Vec<Association>, ServiceError> {
        let rows = self
            .db
            .query(
                "SELECT id, company_id, collection_id FROM company_collection_associations \
                 WHERE collection_id = ?1 ORDER BY id",
                &[Value::Text(collection_id.to_string())],
            )
            .map_err(storage)?;
        rows.iter().map(row_to_association).collect()
    }

    /// Association rows matching both the collection and one of `company_ids`.
    pub fn associations_matching(
        &self,
        collection_id: Uuid,
        company_ids: &[i64],
    ) -> Result<Vec<Association>, ServiceError> {
        let wanted: BTreeSet<i64> = company_ids.iter().copied().collect();
        Ok(self
            .associations_in(collection_id)?
            .into_iter()
            .filter(|a| wanted.contains(&a.company_id))
            .collect())
    }

    /// Insert one association in its own transaction.
    ///
    /// A duplicate pair is reported as `Conflict`.
    pub fn add_association(
        &self,
        company_id: i64,
        collection_id: Uuid,
    ) -> Result<(), ServiceError> {
        self.db
            .transaction(&[Statement::new(
                INSERT_ASSOCIATION,
                vec![
                    Value::Integer(company_id),
                    Value::Text(collection_id.to_string()),
                ],
            )])
            .map_err(|e| {
                if e.is_constraint() {
                    ServiceError::Conflict(format!(
                        "Company {company_id} is already in collection {collection_id}"
                    ))
                } else {
                    storage(e)
                }
            })?;
        Ok(())
    }

    /// Delete one association row by id in its own transaction.
    pub fn delete_association(&self, association_id: i64) -> Result<(), ServiceError> {
        let affected = self
            .db
            .transaction(&[Statement::new(
                "DELETE FROM company_collection_associations WHERE id = ?1",
                vec![Value::Integer(association_id)],
            )])
            .map_err(storage)?;
        if affected == 0 {
            return Err(ServiceError::NotFound(format!(
                "association {association_id} no longer exists"
            )));
        }
        Ok(())
    }

    /// Delete the association for a (company, collection) pair.
    pub fn remove_association(
        &self,
        company_id: i64,
        collection_id: Uuid,
    ) -> Result<(), ServiceError> {
        let affected = self
            .db
            .transaction(&[Statement::new(
                "DELETE FROM company_collection_associations \
                 WHERE company_id = ?1 AND collection_id = ?2",
                vec![
                    Value::Integer(company_id),
                    Value::Text(collection_id.to_string()),
                ],
            )])
            .map_err(storage)?;
        if affected == 0 {
            return Err(ServiceError::NotFound(
                "Company not found in this collection".into(),
            ));
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Settings
    // -----------------------------------------------------------------------

    pub fn has_setting(&self, name: &str) -> Result<bool, ServiceError> {
        let rows = self
            .db
            .query(
                "SELECT setting_name FROM settings WHERE setting_name = ?1",
                &[Value::Text(name.to_string())],
            )
            .map_err(storage)?;
        Ok(!rows.is_empty())
    }
}

fn row_to_company(row: &Row) -> Result<Company, ServiceError> {
    Ok(Company {
        id: row
            .get_i64("id")
            .ok_or_else(|| ServiceError::Storage("missing id column".into()))?,
        company_name: row
            .get_str("company_name")
            .ok_or_else(|| ServiceError::Storage("missing company_name column".into()))?
            .to_string(),
        liked: row.get_i64("liked").is_some_and(|v| v != 0),
    })
}

fn liked_param() -> Value {
    Value::Text(LIKED_COLLECTION.to_string())
}

fn row_to_collection(row: &Row) -> Result<Collection, ServiceError> {
    Ok(Collection {
        id: parse_uuid(row, "id")?,
        collection_name: row
            .get_str("collection_name")
            .ok_or_else(|| ServiceError::Storage("missing collection_name column".into()))?
            .to_string(),
    })
}

fn row_to_association(row: &Row) -> Result<Association, ServiceError> {
    Ok(Association {
        id: row
            .get_i64("id")
            .ok_or_else(|| ServiceError::Storage("missing id column".into()))?,
        company_id: row
            .get_i64("company_id")
            .ok_or_else(|| ServiceError::Storage("missing company_id column".into()))?,
        collection_id: parse_uuid(row, "collection_id")?,
    })
}

fn parse_uuid(row: &Row, column: &str) -> Result<Uuid, ServiceError> {
    let raw = row
        .get_str(column)
        .ok_or_else(|| ServiceError::Storage(format!("missing {column} column")))?;
    Uuid::parse_str(raw).map_err(|e| ServiceError::Storage(format!("bad uuid in {column}: {e}")))
}

/// Single-row writers used to build fixtures.
#[cfg(test)]
impl CollectionStore {
    pub fn create_company(&self, name: &str) -> Result<Company, ServiceError> {
        let rows = self
            .db
            .query(
                "INSERT INTO companies (company_name) VALUES (?1) RETURNING id, company_name",
                &[Value::Text(name.to_string())],
            )
            .map_err(storage)?;
        rows.first()
            .map(row_to_company)
            .transpose()?
            .ok_or_else(|| ServiceError::Internal("inserted company vanished".into()))
    }

    pub fn create_companies(&self, names: &[String]) -> Result<u64, ServiceError> {
        let statements: Vec<Statement> = names
            .iter()
            .map(|name| {
                Statement::new(
                    "INSERT INTO companies (company_name) VALUES (?1)",
                    vec![Value::Text(name.clone())],
                )
            })
            .collect();
        self.db.transaction(&statements).map_err(storage)
    }

    /// The first `limit` company ids, ascending.
    pub fn first_company_ids(&self, limit: usize) -> Result<Vec<i64>, ServiceError> {
        let rows = self
            .db
            .query(
                "SELECT id FROM companies ORDER BY id LIMIT ?1",
                &[Value::Integer(limit as i64)],
            )
            .map_err(storage)?;
        Ok(rows.iter().filter_map(|r| r.get_i64("id")).collect())
    }

    pub fn create_collection(&self, name: &str) -> Result<Collection, ServiceError> {
        let collection = Collection {
            id: Uuid::new_v4(),
            collection_name: name.to_string(),
        };
        self.db
            .exec(
                "INSERT INTO company_collections (id, collection_name) VALUES (?1, ?2)",
                &[
                    Value::Text(collection.id.to_string()),
                    Value::Text(collection.collection_name.clone()),
                ],
            )
            .map_err(storage)?;
        Ok(collection)
    }

    /// Insert associations for many companies in one transaction.
    pub fn add_associations(
        &self,
        company_ids: &[i64],
        collection_id: Uuid,
    ) -> Result<u64, ServiceError> {
        let statements: Vec<Statement> = company_ids
            .iter()
            .map(|id| {
                Statement::new(
                    INSERT_ASSOCIATION,
                    vec![Value::Integer(*id), Value::Text(collection_id.to_string())],
                )
            })
            .collect();
        self.db.transaction(&statements).map_err(storage)
    }

    pub fn put_setting(&self, name: &str) -> Result<(), ServiceError> {
        self.db
            .exec(
                "INSERT OR IGNORE INTO settings (setting_name) VALUES (?1)",
                &[Value::Text(name.to_string())],
            )
            .map_err(storage)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jam_sql::SqliteStore;

    fn test_store() -> CollectionStore {
        let db = Arc::new(SqliteStore::open_in_memory().unwrap());
        CollectionStore::new(db).unwrap()
    }

    #[test]
    fn schema_init_is_idempotent() {
        let db: Arc<dyn SQLStore> = Arc::new(SqliteStore::open_in_memory().unwrap());
        CollectionStore::new(Arc::clone(&db)).unwrap();
        CollectionStore::new(db).unwrap();
    }

    #[test]
    fn create_and_get_company() {
        let store = test_store();
        let a = store.create_company("Acme").unwrap();
        let b = store.create_company("Globex").unwrap();
        assert_ne!(a.id, b.id);

        assert_eq!(store.get_company(a.id).unwrap(), Some(a));
        assert!(store.get_company(9999).unwrap().is_none());
        assert_eq!(store.list_companies().unwrap().len(), 2);
    }

    #[test]
    fn create_and_get_collection() {
        let store = test_store();
        let c = store.create_collection("My List").unwrap();
        assert_eq!(store.get_collection(c.id).unwrap(), Some(c.clone()));
        assert!(store.get_collection(Uuid::new_v4()).unwrap().is_none());
        assert_eq!(store.list_collections().unwrap(), vec![c]);
    }

    #[test]
    fn duplicate_association_is_conflict() {
        let store = test_store();
        let company = store.create_company("Acme").unwrap();
        let list = store.create_collection("My List").unwrap();

        store.add_association(company.id, list.id).unwrap();
        let err = store.add_association(company.id, list.id).unwrap_err();
        assert!(matches!(err, ServiceError::Conflict(_)), "got {err:?}");
        assert_eq!(store.associations_in(list.id).unwrap().len(), 1);
    }

    #[test]
    fn association_to_missing_company_is_storage_error() {
        let store = test_store();
        let list = store.create_collection("My List").unwrap();
        let err = store.add_association(42, list.id).unwrap_err();
        assert!(matches!(err, ServiceError::Storage(_)), "got {err:?}");
    }

    #[test]
    fn remove_association() {
        let store = test_store();
        let company = store.create_company("Acme").unwrap();
        let list = store.create_collection("My List").unwrap();
        store.add_association(company.id, list.id).unwrap();

        store.remove_association(company.id, list.id).unwrap();
        assert!(store.company_ids_in(list.id).unwrap().is_empty());

        let err = store.remove_association(company.id, list.id).unwrap_err();
        assert!(matches!(err, ServiceError::NotFound(_)));
    }

    #[test]
    fn delete_association_by_id() {
        let store = test_store();
        let company = store.create_company("Acme").unwrap();
        let list = store.create_collection("My List").unwrap();
        store.add_association(company.id, list.id).unwrap();
        let row = store.associations_in(list.id).unwrap()[0];

        store.delete_association(row.id).unwrap();
        assert!(store.delete_association(row.id).is_err());
    }

    #[test]
    fn associations_matching_filters_both_keys() {
        let store = test_store();
        let ids: Vec<i64> = (0..4)
            .map(|i| store.create_company(&format!("Co {i}")).unwrap().id)
            .collect();
        let a = store.create_collection("A").unwrap();
        let b = store.create_collection("B").unwrap();
        store.add_associations(&ids, a.id).unwrap();
        store.add_associations(&ids[..2], b.id).unwrap();

        let rows = store.associations_matching(a.id, &[ids[0], ids[3], 777]).unwrap();
        let matched: Vec<i64> = rows.iter().map(|r| r.company_id).collect();
        assert_eq!(matched, vec![ids[0], ids[3]]);
        assert!(rows.iter().all(|r| r.collection_id == a.id));
    }

    #[test]
    fn collection_companies_join() {
        let store = test_store();
        let acme = store.create_company("Acme").unwrap();
        let _other = store.create_company("Other").unwrap();
        let list = store.create_collection("Liked").unwrap();
        store.add_association(acme.id, list.id).unwrap();

        assert_eq!(store.collection_companies(list.id).unwrap(), vec![acme]);
    }

    #[test]
    fn bulk_company_insert_and_first_ids() {
        let store = test_store();
        let names: Vec<String> = (0..20).map(|i| format!("Co {i}")).collect();
        assert_eq!(store.create_companies(&names).unwrap(), 20);

        let first = store.first_company_ids(5).unwrap();
        assert_eq!(first.len(), 5);
        assert!(first.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn settings_flag() {
        let store = test_store();
        assert!(!store.has_setting("seeded").unwrap());
        store.put_setting("seeded").unwrap();
        store.put_setting("seeded").unwrap();
        assert!(store.has_setting("seeded").unwrap());
    }

    #[test]
    fn liked_follows_liked_collection_membership() {
        let store = test_store();
        let acme = store.create_company("Acme").unwrap();
        let globex = store.create_company("Globex").unwrap();
        assert!(!acme.liked);

        let liked = store.create_collection(LIKED_COLLECTION).unwrap();
        let other = store.create_collection("My List").unwrap();
        store.add_association(acme.id, liked.id).unwrap();
        store.add_association(globex.id, other.id).unwrap();

        assert!(store.get_company(acme.id).unwrap().unwrap().liked);
        assert!(!store.get_company(globex.id).unwrap().unwrap().liked);
        let flags: Vec<(i64, bool)> = store
            .list_companies()
            .unwrap()
            .into_iter()
            .map(|c| (c.id, c.liked))
            .collect();
        assert_eq!(flags, vec![(acme.id, true), (globex.id, false)]);

        let members = store.collection_companies(other.id).unwrap();
        assert_eq!(members.len(), 1);
        assert!(!members[0].liked);

        store.remove_association(acme.id, liked.id).unwrap();
        assert!(!store.get_company(acme.id).unwrap().unwrap().liked);
    }

    #[test]
    fn replace_all_discards_previous_rows() {
        let store = test_store();
        let stale = store.create_company("Stale").unwrap();
        let old = store.create_collection("My List").unwrap();
        store.add_association(stale.id, old.id).unwrap();

        let names: Vec<String> = (0..4).map(|i| format!("Co {i}")).collect();
        let created = store
            .replace_all(&names, &[("All", 4), ("Top", 2)], "seeded")
            .unwrap();

        let companies = store.list_companies().unwrap();
        let ids: Vec<i64> = companies.iter().map(|c| c.id).collect();
        assert_eq!(ids, vec![1, 2, 3, 4]);
        assert_eq!(companies[0].company_name, "Co 0");

        assert_eq!(store.list_collections().unwrap(), created);
        assert!(store.get_collection(old.id).unwrap().is_none());
        assert_eq!(
            store.company_ids_in(created[0].id).unwrap(),
            BTreeSet::from([1, 2, 3, 4])
        );
        assert_eq!(store.company_ids_in(created[1].id).unwrap(), BTreeSet::from([1, 2]));
        assert!(store.has_setting("seeded").unwrap());
    }

    #[tokio::test(flavor = "current_thread")]
    async fn run_blocking_leaves_the_runtime_thread() {
        let store = Arc::new(test_store());
        let caller = std::thread::current().id();

        let (worker, company) = store
            .run_blocking(|s| Ok((std::thread::current().id(), s.create_company("Acme")?)))
            .await
            .unwrap();
        assert_ne!(worker, caller);
        assert_eq!(company.company_name, "Acme");

        let err = store
            .run_blocking(move |s| s.remove_association(company.id, Uuid::new_v4()))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::NotFound(_)));
    }
}
