//! ruleq - contexts, a priority rule matcher and concurrent queues
//!
//! Three components that share a single collaborator, the [`Context`]:
//!
//! - [`Context`]: keyed values, parent fallback, deadline, cancellation, metadata
//! - [`Matcher<T>`]: priority-ordered rule evaluation with middleware, caching and stats
//! - [`BoundedQueue<T>`], [`FifoQueue<T>`], [`LifoQueue<T>`], [`PriorityQueue<T>`]: queues
//!   whose blocking and cancellation contracts read the caller's context
//! - [`Deque<T>`]: a power-of-two ring buffer
//!
//! # Key Design Insights
//!
//! 1. **Snapshot publication**: the matcher's rule list is an immutable snapshot swapped
//!    atomically. Readers load it once per call and never see a partial mutation.
//!
//! 2. **Lazy sort**: adding rules is cheap. The first evaluation after a mutation sorts
//!    by priority (descending, stable) and publishes the sorted snapshot.
//!
//! 3. **Missing → false**: a value condition on a key the context does not hold is
//!    `false`. The matcher never returns errors; a non-match is `None`.
//!
//! 4. **Cooperative cancellation**: nothing is interrupted. Blocking queue operations
//!    wake when the context is done and return its error.
//!
//! # Example
//!
//! ```
//! use ruleq::prelude::*;
//!
//! let matcher: Matcher<&str> = Matcher::new();
//! matcher
//!     .add_rule(ChainRule::new("low").priority(10).when(|_| true))
//!     .add_rule(
//!         ChainRule::new("admin")
//!             .priority(100)
//!             .when_value("role", StringMatcher::exact("admin")),
//!     );
//!
//! let ctx = Context::new();
//! ctx.with_value("role", "admin");
//! assert_eq!(matcher.find(&ctx), Some("admin"));
//!
//! ctx.with_value("role", "guest");
//! assert_eq!(matcher.find(&ctx), Some("low"));
//! ```
//!
//! # Features
//!
//! - `json` (default): serde derives and JSON-encoded metadata on [`Context`]
//! - `config`: declarative rule files ([`RuleSetConfig`]) in YAML or JSON

// ═══════════════════════════════════════════════════════════════════════════════
// Modules
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(feature = "config")]
mod config;
pub mod context;
pub mod matcher;
pub mod queue;

// ═══════════════════════════════════════════════════════════════════════════════
// Re-exports
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(feature = "config")]
pub use config::{ConditionConfig, Literal, RuleConfig, RuleSetConfig};
pub use context::{
    merge_contexts, or_background, parse_duration, with_timeout, with_timeout_in,
    with_timeout_value, BufferPool, CancelReason, Cancellation, Context, DoneGuard, FromValue,
    Key, Listener, ListenerGuard, Value,
};
pub use matcher::{
    fingerprint, generate_id, BoolMatcher, CacheConfig, ChainRule, Condition, EqualsMatcher,
    FnMiddleware, FnRule, MatchTrace, Matcher, MatcherStats, MetadataTag, Middleware, Next,
    Predicate, PresentMatcher, Rule, RuleTrace, StringMatchSpec, StringMatcher,
    TracingMiddleware, ValueMatcher,
};
pub use queue::{
    BoundedQueue, BoundedQueueConfig, BoundedQueueStats, Deque, FifoQueue, LifoQueue,
    Prioritized, PriorityQueue, Queue,
};

/// Convenient re-exports for common usage.
pub mod prelude {
    pub use crate::{
        // Context
        Context,
        ContextError,
        Key,
        Value,
        FromValue,
        // Matcher
        ChainRule,
        FnRule,
        Matcher,
        MatcherStats,
        Middleware,
        Rule,
        // Conditions
        EqualsMatcher,
        PresentMatcher,
        StringMatcher,
        ValueMatcher,
        // Queues
        BoundedQueue,
        Deque,
        FifoQueue,
        LifoQueue,
        Prioritized,
        PriorityQueue,
        Queue,
        QueueError,
    };

    #[cfg(feature = "config")]
    pub use crate::{ConfigError, RuleSetConfig};
}

// ═══════════════════════════════════════════════════════════════════════════════
// Errors
// ═══════════════════════════════════════════════════════════════════════════════

/// Why a context is done, or why a context operation failed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ContextError {
    /// The context was cancelled explicitly.
    #[error("context cancelled")]
    Cancelled,

    /// The context's deadline elapsed.
    #[error("context deadline exceeded")]
    DeadlineExceeded,

    /// The key cannot be stored (the empty string is the nil key).
    #[error("invalid context key: {reason}")]
    InvalidKey {
        /// What is wrong with the key.
        reason: String,
    },

    /// No metadata entry under the key.
    #[error("metadata key \"{key}\" not found")]
    KeyNotFound {
        /// The missing key.
        key: String,
    },

    /// A metadata value could not be encoded.
    #[error("failed to encode metadata \"{key}\": {detail}")]
    MarshalFailed {
        /// Metadata key being written.
        key: String,
        /// Encoder message.
        detail: String,
    },

    /// A metadata entry could not be decoded into the requested type.
    #[error("failed to decode metadata \"{key}\": {detail}")]
    UnmarshalFailed {
        /// Metadata key being read.
        key: String,
        /// Decoder message.
        detail: String,
    },

    /// A timed task panicked before producing a result.
    #[error("timed task panicked")]
    TaskPanicked,
}

/// Errors returned by queue operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QueueError {
    /// The queue was closed.
    #[error("queue is closed")]
    Closed,

    /// The queue is at its maximum capacity.
    #[error("queue is full")]
    Full,

    /// Non-blocking dequeue on an empty queue.
    #[error("queue is empty")]
    Empty,

    /// The caller's context is done.
    #[error(transparent)]
    Context(#[from] ContextError),
}

/// Errors raised while compiling declarative configuration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// The document could not be parsed.
    #[error("invalid config: {detail}")]
    Parse {
        /// Parser message.
        detail: String,
    },

    /// A regex pattern failed to compile.
    #[error("invalid pattern \"{pattern}\": {detail}")]
    InvalidPattern {
        /// The offending pattern.
        pattern: String,
        /// Compiler message.
        detail: String,
    },

    /// A condition names no operator, or more than one.
    #[error("rule \"{rule}\": condition on \"{key}\" {detail}")]
    InvalidCondition {
        /// Rule the condition belongs to.
        rule: String,
        /// Key the condition reads.
        key: String,
        /// What is wrong with it.
        detail: String,
    },

    /// Two rules share an id.
    #[error("duplicate rule id \"{id}\"")]
    DuplicateId {
        /// The repeated id.
        id: String,
    },
}
