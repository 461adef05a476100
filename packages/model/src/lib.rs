pub mod copy_tracker;
pub mod error;
pub mod history;
pub mod id_generator;
pub mod object;
pub mod overrides;
pub mod prompt_xml;
pub mod store;
pub mod value;

pub use copy_tracker::{copies_of, copy_root, is_copy_of, CopyChain};
pub use error::{StoreError, StoreResult};
pub use history::{NoHistory, SnapshotHistory};
pub use id_generator::IdGenerator;
pub use object::{
    ChildIds, ObjectId, ObjectKind, ObjectRecord, ObjectsDocument, Properties, RuleDefinition,
    RuleException, RuleRecord, RuleState,
};
pub use overrides::{OverrideBase, OverrideId, OverrideLayer, OverrideRecord, Resolved};
pub use prompt_xml::to_prompt_xml;
pub use store::ObjectStore;
pub use value::{format_number, Value};
