//! Compilation options.

/// How transitions without a triggering event are compiled.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum EventlessPolicy {
    /// Eventless transitions are a compilation error.
    #[default]
    Reject,
    /// Eventless transitions never fire and are dropped.
    Ignore,
    /// Eventless transitions fire as soon as their source state has been entered.
    Immediate,
}

/// Default bound on the number of flat states.
pub const DEFAULT_MAX_STATES: usize = 4096;

/// Options steering a compiler invocation.
///
/// There is no global configuration: every invocation gets its own copy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompileOptions {
    pub eventless: EventlessPolicy,
    /// Prefix through which action and guard fragments address the machine's fields.
    pub field_accessor: String,
    /// Treat validation warnings as errors.
    pub deny_warnings: bool,
    /// Largest number of flat states flattening may produce.
    pub max_states: usize,
}

impl Default for CompileOptions {
    fn default() -> Self {
        CompileOptions {
            eventless: EventlessPolicy::default(),
            field_accessor: String::from("machine->"),
            deny_warnings: false,
            max_states: DEFAULT_MAX_STATES,
        }
    }
}
