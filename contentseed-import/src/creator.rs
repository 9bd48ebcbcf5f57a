//! The structural event vocabulary readers push into.

use chrono::{DateTime, Utc};
use contentseed_types::{AccessControlEntry, PrincipalDefinition, PropertyValue};

use crate::ImportResult;

/// Receives structural events from a [`ContentReader`](crate::ContentReader)
/// in document order.
///
/// Node events nest: every [`create_node`](Self::create_node) and
/// [`switch_current_node`](Self::switch_current_node) is closed by one
/// [`finish_node`](Self::finish_node). Properties, files, and ACEs apply to
/// the current node.
pub trait ContentCreator {
    /// Creates a child node of the current node and makes it current.
    ///
    /// A `None` name asks the creator to pick one (the source file name, or
    /// the import target itself for parent-node imports).
    fn create_node(
        &mut self,
        name: Option<&str>,
        primary_type: Option<&str>,
        mixins: &[String],
    ) -> ImportResult<()>;

    /// Returns to the parent of the current node.
    fn finish_node(&mut self) -> ImportResult<()>;

    fn create_property(&mut self, name: &str, value: PropertyValue) -> ImportResult<()>;

    /// Creates a file leaf under the current node. Does not change the
    /// current node.
    fn create_file(
        &mut self,
        name: &str,
        data: &[u8],
        mime_type: Option<&str>,
        last_modified: Option<DateTime<Utc>>,
    ) -> ImportResult<()>;

    /// Makes the relative `sub_path` current, creating missing segments as
    /// `folder_type` nodes. Existing segments are reused.
    fn switch_current_node(&mut self, sub_path: &str, folder_type: &str) -> ImportResult<()>;

    fn create_principal(&mut self, principal: PrincipalDefinition) -> ImportResult<()>;

    /// Adds an access-control entry to the current node.
    fn create_ace(&mut self, ace: AccessControlEntry) -> ImportResult<()>;

    /// Offers an archive member to a registered reader. Returns `false` when
    /// no reader applies and the caller should store it as a plain file.
    fn import_nested(&mut self, name: &str, data: &[u8]) -> ImportResult<bool>;
}
