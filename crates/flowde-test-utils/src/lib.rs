//! Fixtures and fakes shared by the Flowde test suites.

pub mod breakdown;
pub mod faulty;
pub mod fixtures;

pub use breakdown::{breakdown_reply, FailingBreakdown, GatedBreakdown, StaticBreakdown};
pub use faulty::FaultyStore;
pub use fixtures::{
    config_from_toml, edge_names, memory_store, owner, parent_name, stranger, temp_store,
    test_config, GraphFixture,
};
