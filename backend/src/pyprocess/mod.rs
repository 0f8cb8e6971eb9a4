pub mod interpreter;
pub mod invoker;

pub use interpreter::InterpreterResolver;
pub use invoker::{ClassifierInvocation, ClassifierInvoker, Dependency, InvokerError};
