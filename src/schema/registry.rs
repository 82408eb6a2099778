//! Built-in document collections

use super::{CollectionSpec, IndexDefinition, IndexDirection};

pub const REQUEST_COLLECTION: &str = "request";
pub const SYSTEM_COLLECTION: &str = "system";
pub const ROLE_COLLECTION: &str = "role";
pub const JOB_COLLECTION: &str = "job";

/// Every collection the bootstrap reconciles, in the order it visits them
pub fn builtin_collections() -> Vec<CollectionSpec> {
    vec![
        request_collection(),
        system_collection(),
        role_collection(),
        job_collection(),
    ]
}

/// Look up a built-in collection by name
pub fn find_collection(name: &str) -> Option<CollectionSpec> {
    builtin_collections().into_iter().find(|c| c.name() == name)
}

fn request_collection() -> CollectionSpec {
    CollectionSpec::new(REQUEST_COLLECTION)
        .with_index(IndexDefinition::ascending("parent").named("parent_index"))
        .with_index(IndexDefinition::ascending("status"))
        .with_index(IndexDefinition::ascending("command_type"))
        .with_index(IndexDefinition::descending("created_at"))
        .with_index(
            IndexDefinition::new([
                ("system", IndexDirection::Ascending),
                ("system_version", IndexDirection::Ascending),
                ("instance_name", IndexDirection::Ascending),
                ("command", IndexDirection::Ascending),
            ])
            .named("command_index"),
        )
        .with_index(IndexDefinition::text(["comment"]).named("comment_text_index"))
        // Compound parent/instance index replaced by `parent_index`
        .with_legacy_index("parent_instance_index")
}

fn system_collection() -> CollectionSpec {
    CollectionSpec::new(SYSTEM_COLLECTION).with_index(
        IndexDefinition::new([
            ("namespace", IndexDirection::Ascending),
            ("name", IndexDirection::Ascending),
            ("version", IndexDirection::Ascending),
        ])
        .named("unique_system_index")
        .unique(),
    )
}

fn role_collection() -> CollectionSpec {
    // The unique name index is what turns a concurrent role insert into a
    // uniqueness violation instead of a duplicate role.
    CollectionSpec::new(ROLE_COLLECTION)
        .with_index(IndexDefinition::ascending("name").named("role_name_index").unique())
}

fn job_collection() -> CollectionSpec {
    CollectionSpec::new(JOB_COLLECTION)
        .with_index(IndexDefinition::ascending("next_run_time"))
        .with_index(IndexDefinition::ascending("name").sparse())
}
