//! Error kinds and context.

use ruleweave_foundation::{Error, ErrorContext, ErrorKind, SemanticLimit};

#[test]
fn limit_exceeded_names_the_limit() {
    let err = Error::limit_exceeded(SemanticLimit::MaxFireCycles {
        limit: 5,
        context: None,
    })
    .with_context(ErrorContext::new().with_cycle(6));
    assert!(matches!(
        err.kind,
        ErrorKind::LimitExceeded(SemanticLimit::MaxFireCycles { limit: 5, .. })
    ));
    assert_eq!(err.to_string(), "limit exceeded: max fire cycles (5) exceeded");
    assert_eq!(err.context.and_then(|c| c.cycle), Some(6));
}

#[test]
fn context_display() {
    let ctx = ErrorContext::new()
        .with_rule("R1")
        .with_fact_type("Person")
        .with_cycle(2);
    assert_eq!(ctx.to_string(), "in rule R1, for type Person, at cycle 2");
    assert_eq!(ErrorContext::new().to_string(), "");
}

#[test]
fn error_messages() {
    assert_eq!(
        Error::unallocated_bucket(4).to_string(),
        "memory bucket 4 was never allocated"
    );
    assert_eq!(
        Error::new(ErrorKind::InvalidComplexity(-1.0)).to_string(),
        "condition complexity must be positive, got -1"
    );
    assert_eq!(Error::rhs("boom").to_string(), "rule action failed: boom");
}
