use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Membership in this collection is reported as [`Company::liked`].
pub const LIKED_COLLECTION: &str = "Liked Companies List";

// ---------------------------------------------------------------------------
// Stored entities
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Company {
    pub id: i64,
    pub company_name: String,
    /// Whether the company is in the liked collection. Derived, not stored.
    #[serde(default)]
    pub liked: bool,
}

/// A named group of companies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Collection {
    pub id: Uuid,
    pub collection_name: String,
}

/// One row linking a company to a collection. Unique per
/// (company_id, collection_id).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Association {
    pub id: i64,
    pub company_id: i64,
    pub collection_id: Uuid,
}

// ---------------------------------------------------------------------------
// API request bodies
// ---------------------------------------------------------------------------

/// Body for `POST /collections/{collection_id}/companies`.
#[derive(Debug, Deserialize)]
pub struct CompanyAssociationIn {
    pub company_id: i64,
}

/// Body for `POST /actions/transfer-collection`.
#[derive(Debug, Clone, Deserialize)]
pub struct BulkTransferIn {
    pub source_collection_id: Uuid,
    pub destination_collection_id: Uuid,
}

/// Body for `POST /actions/transfer-selection`.
#[derive(Debug, Clone, Deserialize)]
pub struct SelectiveTransferIn {
    pub company_ids: Vec<i64>,
    pub destination_collection_id: Uuid,
}

/// Body for `DELETE /actions/collection-contents`.
#[derive(Debug, Clone, Deserialize)]
pub struct BulkDeleteIn {
    pub collection_id: Uuid,
}

/// Body for `POST /actions/delete-selection`.
#[derive(Debug, Clone, Deserialize)]
pub struct SelectiveDeleteIn {
    pub collection_id: Uuid,
    pub company_ids: Vec<i64>,
}

// ---------------------------------------------------------------------------
// API responses
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
pub struct CompanyList {
    pub companies: Vec<Company>,
    pub total: usize,
}

/// A collection with its member companies.
#[derive(Debug, Serialize)]
pub struct CollectionDetail {
    pub id: Uuid,
    pub collection_name: String,
    pub companies: Vec<Company>,
    pub total: usize,
}

#[derive(Debug, Serialize)]
pub struct MessageOut {
    pub message: String,
}
