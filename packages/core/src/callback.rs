use std::any::Any;
use std::fmt::Display;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::rc::Rc;

use crate::error::CallbackError;

/// A type-erased appearance callback.
pub(crate) type Callback<N> = Rc<dyn Fn(N) -> Result<(), CallbackError>>;

pub(crate) fn infallible<N>(f: impl Fn(N) + 'static) -> Callback<N> {
    Rc::new(move |node| {
        f(node);
        Ok(())
    })
}

pub(crate) fn fallible<N, E: Display>(f: impl Fn(N) -> Result<(), E> + 'static) -> Callback<N> {
    Rc::new(move |node| f(node).map_err(|err| CallbackError::Failed(err.to_string())))
}

/// Run the callback, turning a panic into a [`CallbackError`].
///
/// With `panic = "abort"` (the default on `wasm32-unknown-unknown`) nothing is caught.
pub(crate) fn invoke<N>(callback: &Callback<N>, node: N) -> Result<(), CallbackError> {
    match catch_unwind(AssertUnwindSafe(|| callback(node))) {
        Ok(result) => result,
        Err(payload) => Err(CallbackError::Panicked(panic_message(payload))),
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        return message.to_string();
    }
    match payload.downcast::<String>() {
        Ok(message) => *message,
        Err(_) => "<non-string panic payload>".to_string(),
    }
}
