use thiserror::Error;

use crate::dom::NodeId;

/// The lifecycle hook an error came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HookKind {
    BeforeMount,
    Mount,
    BeforeUpdate,
    Update,
    Unmount,
}

impl std::fmt::Display for HookKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            HookKind::BeforeMount => "onBeforeMount",
            HookKind::Mount => "onMount",
            HookKind::BeforeUpdate => "onBeforeUpdate",
            HookKind::Update => "onUpdate",
            HookKind::Unmount => "onUnmount",
        })
    }
}

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("unknown component '{0}'")]
    UnknownComponent(String),

    #[error("component '{0}' is already registered")]
    DuplicateComponent(String),

    #[error("setup of component '{component}' failed")]
    Setup {
        component: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("setup of component '{component}' returned reserved name '{name}'")]
    ReservedName { component: String, name: String },

    #[error("{hook} hook of component '{component}' failed")]
    Hook {
        component: String,
        hook: HookKind,
        #[source]
        source: anyhow::Error,
    },

    #[error(transparent)]
    Selector(#[from] SelectorError),

    #[error("no instance is mounted on node {0:?}")]
    NotMounted(NodeId),

    #[error("plugin '{0}' is already installed")]
    DuplicatePlugin(String),

    #[error("plugin '{0}' is not installed")]
    UnknownPlugin(String),

    #[error("plugin '{name}' failed to install")]
    Plugin {
        name: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("runtime has been torn down")]
    TornDown,
}

#[derive(Clone, Debug, Error, PartialEq)]
#[error("invalid selector '{selector}': {reason}")]
pub struct SelectorError {
    pub selector: String,
    pub reason: String,
}

#[derive(Clone, Debug, Error, PartialEq)]
pub enum EvalError {
    #[error("'{0}' is not defined")]
    Undefined(String),
    #[error("cannot parse expression '{0}'")]
    Syntax(String),
    #[error("{0}")]
    Other(String),
}

/// A single event/prop binding that could not be applied. Logged and
/// skipped; the rest of the patch still applies.
#[derive(Clone, Debug, Error, PartialEq)]
pub enum BindingError {
    #[error("expression '{expression}' for '{attribute}' failed: {source}")]
    Eval {
        attribute: String,
        expression: String,
        #[source]
        source: EvalError,
    },
    #[error("expression '{expression}' for event '{event}' is not a handler")]
    NotCallable { event: String, expression: String },
}

pub type Result<T, E = RuntimeError> = std::result::Result<T, E>;
