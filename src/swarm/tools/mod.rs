//! Built-in tool implementations (spec §4.4 built-in set) and the
//! factories that bind them to an agent's [`crate::swarm::tool_factory::ToolBuildContext`].

pub mod bash;
pub mod clock;
pub mod filesystem;
pub mod memory;
pub mod think;
pub mod todowrite;

pub use bash::{BashTool, BashToolFactory};
pub use clock::{ClockTool, ClockToolFactory};
pub use filesystem::{EditTool, EditToolFactory, ReadTool, ReadToolFactory, WriteTool, WriteToolFactory};
pub use memory::{MemoryTool, PluginToolRegistry};
pub use think::{ThinkTool, ThinkToolFactory};
pub use todowrite::{TodoItem, TodoWriteTool, TodoWriteToolFactory};

use crate::swarm::tool_factory::ToolFactoryRegistry;
use std::sync::Arc;

/// Build a [`ToolFactoryRegistry`] pre-populated with every built-in,
/// non-memory tool factory (`Bash`, `Read`, `Write`, `Edit`, `Think`,
/// `Clock`, `TodoWrite`). Memory tools are wired separately through
/// [`PluginToolRegistry`], per spec §4.4.
#[must_use]
pub fn builtin_factory_registry() -> ToolFactoryRegistry {
    let mut registry = ToolFactoryRegistry::empty();
    registry.register(Arc::new(BashToolFactory));
    registry.register(Arc::new(ReadToolFactory));
    registry.register(Arc::new(WriteToolFactory));
    registry.register(Arc::new(EditToolFactory));
    registry.register(Arc::new(ThinkToolFactory));
    registry.register(Arc::new(ClockToolFactory));
    registry.register(Arc::new(TodoWriteToolFactory));
    registry
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_registry_validates_every_built_in_name() {
        let registry = builtin_factory_registry();
        let names = vec![
            "Bash".to_string(),
            "Read".to_string(),
            "Write".to_string(),
            "Edit".to_string(),
            "Think".to_string(),
            "Clock".to_string(),
            "TodoWrite".to_string(),
        ];
        assert!(registry.validate(&names).is_empty());
    }

    #[test]
    fn non_removable_names_cover_think_clock_todowrite() {
        let registry = builtin_factory_registry();
        let non_removable = registry.non_removable_names();
        assert!(non_removable.contains("Think"));
        assert!(non_removable.contains("Clock"));
        assert!(non_removable.contains("TodoWrite"));
        assert!(!non_removable.contains("Bash"));
    }
}
