/*!
 * Monitoring
 * Tracing setup and operation spans for the stress runner and tests
 */

mod tracer;

pub use tracer::{init_test_tracing, init_tracing, span_operation, OperationSpan};
