//! Standard dependency collectors.
//!
//! Each collector contributes one class of edge to the closure computed by
//! [`tether_core::DependencyCalculator`]:
//!
//! - [`EntityReferenceCollector`] — reference and versioned-reference fields
//! - [`LinkFieldCollector`] — link fields (entity, internal, and route URIs)
//! - [`RichTextEmbedCollector`] — entity embeds in rich-text markup
//! - [`PathAliasCollector`] — alias entities pointing at canonical paths
//! - [`ProviderModuleCollector`] — the provider module of each node's type
//!
//! Collectors are read-only over content storage, skip malformed fragments,
//! and are independent of each other's registration order.

pub mod entity_reference;
pub mod link_field;
pub mod path_alias;
pub mod provider_module;
pub mod rich_text;

use std::rc::Rc;

use tether_core::{
    CalcError, ContentNode, DependencyCalculator, DependencyClosure, DependencyCollector,
    DependencyEvent, DependencyStack, EntityStorage, ModuleRegistry, merge_dependencies,
};

pub use entity_reference::EntityReferenceCollector;
pub use link_field::LinkFieldCollector;
pub use path_alias::PathAliasCollector;
pub use provider_module::ProviderModuleCollector;
pub use rich_text::RichTextEmbedCollector;

/// The standard collector set in registration order.
#[must_use]
pub fn default_collectors(
    storage: Rc<dyn EntityStorage>,
    modules: Rc<dyn ModuleRegistry>,
) -> Vec<Box<dyn DependencyCollector>> {
    vec![
        Box::new(EntityReferenceCollector::new(storage.clone())),
        Box::new(LinkFieldCollector::new(storage.clone(), modules.clone())),
        Box::new(RichTextEmbedCollector::new(storage.clone())),
        Box::new(PathAliasCollector::new(storage)),
        Box::new(ProviderModuleCollector::new(modules)),
    ]
}

/// Resolve `target`'s own closure, fold it back into the target's wrapper,
/// and add the direct edge (which also propagates the target's dependency
/// set into the event's wrapper). Shared by every entity-edge collector so
/// nested discovery resolves in one pass.
pub(crate) fn attach_target(
    calculator: &DependencyCalculator,
    stack: &mut DependencyStack,
    event: &mut DependencyEvent,
    target: &ContentNode,
) -> Result<(), CalcError> {
    let handle = match target.uuid.as_ref().and_then(|uuid| stack.get_dependency(uuid)) {
        Some(existing) => existing,
        None => calculator.wrap(target)?,
    };
    let mut sub = DependencyClosure::default();
    calculator.calculate_into(&handle, stack, &mut sub)?;
    merge_dependencies(&handle, stack, &sub)?;
    event.add_dependency(&handle, stack)?;
    Ok(())
}
