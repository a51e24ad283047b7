use tracing::info;

use jam_core::ServiceError;

use crate::model::LIKED_COLLECTION;
use crate::store::CollectionStore;

/// Settings row marking a database as already seeded.
pub const SEEDED: &str = "seeded";

const LIKED_COUNT: usize = 10;
const IGNORE_COUNT: usize = 50;

const ADJECTIVES: &[&str] = &[
    "Amber", "Bold", "Brisk", "Calm", "Clever", "Crimson", "Daring", "Eager", "Fancy", "Gentle",
    "Golden", "Happy", "Hidden", "Jolly", "Keen", "Lively", "Lucky", "Mellow", "Misty", "Noble",
    "Proud", "Quiet", "Rapid", "Silent", "Silver", "Sunny", "Swift", "Tidy", "Vivid", "Witty",
];

const NOUNS: &[&str] = &[
    "Anchor", "Badger", "Beacon", "Canyon", "Cedar", "Comet", "Falcon", "Forge", "Garden",
    "Harbor", "Heron", "Island", "Lantern", "Maple", "Meadow", "Orbit", "Otter", "Pebble",
    "Pine", "Prism", "Quartz", "Raven", "River", "Summit", "Thistle", "Tiger", "Valley",
    "Willow", "Yak", "Zephyr",
];

/// Deterministic company name for index `i`.
pub fn company_name(i: usize) -> String {
    let adjective = ADJECTIVES[i % ADJECTIVES.len()];
    let noun = NOUNS[(i / ADJECTIVES.len()) % NOUNS.len()];
    let round = i / (ADJECTIVES.len() * NOUNS.len());
    if round == 0 {
        format!("{adjective} {noun}")
    } else {
        format!("{adjective} {noun} {}", round + 1)
    }
}

/// Populate the database with `companies` companies and the three starter
/// collections. Does nothing once the `seeded` setting exists.
///
/// Rows left by an earlier run that never recorded the setting are replaced.
/// Everything, including the setting, commits in a single transaction.
///
/// Returns whether seeding ran.
pub fn seed(store: &CollectionStore, companies: usize) -> Result<bool, ServiceError> {
    if store.has_setting(SEEDED)? {
        return Ok(false);
    }

    let names: Vec<String> = (0..companies).map(company_name).collect();
    store.replace_all(
        &names,
        &[
            ("My List", companies),
            (LIKED_COLLECTION, LIKED_COUNT),
            ("Companies to Ignore List", IGNORE_COUNT),
        ],
        SEEDED,
    )?;

    info!(companies, "database seeded");
    Ok(true)
}
