//! Fire-and-poll background work.

use std::future::Future;

use futures_channel::oneshot;

/// Outcome of polling a [`Pending`].
#[derive(Debug, PartialEq)]
pub enum TaskState<T> {
    Running,
    Ready(T),
    /// The worker went away without producing a value.
    Lost,
}

/// Receiving end of a background task.
#[derive(Debug)]
pub struct Pending<T> {
    rx: oneshot::Receiver<T>,
}

/// Sending end handed to the worker.
#[derive(Debug)]
pub struct Completer<T> {
    tx: oneshot::Sender<T>,
}

impl<T> Pending<T> {
    pub fn channel() -> (Completer<T>, Pending<T>) {
        let (tx, rx) = oneshot::channel();
        (Completer { tx }, Pending { rx })
    }

    pub fn poll(&mut self) -> TaskState<T> {
        match self.rx.try_recv() {
            Ok(Some(value)) => TaskState::Ready(value),
            Ok(None) => TaskState::Running,
            Err(oneshot::Canceled) => TaskState::Lost,
        }
    }
}

impl<T> Completer<T> {
    pub fn is_canceled(&self) -> bool {
        self.tx.is_canceled()
    }

    /// Delivers the value; silently dropped when nobody is listening anymore.
    pub fn complete(self, value: T) {
        if self.tx.send(value).is_err() {
            log::debug!("task finished after its receiver was dropped");
        }
    }
}

/// Runs `future` in the background and returns a handle to its output.
#[cfg(not(target_arch = "wasm32"))]
pub fn spawn<T, F>(future: F) -> Pending<T>
where
    T: Send + 'static,
    F: Future<Output = T> + Send + 'static,
{
    let (completer, pending) = Pending::channel();
    execute(async move {
        if completer.is_canceled() {
            return;
        }
        completer.complete(future.await);
    });
    pending
}

#[cfg(target_arch = "wasm32")]
pub fn spawn<T, F>(future: F) -> Pending<T>
where
    T: 'static,
    F: Future<Output = T> + 'static,
{
    let (completer, pending) = Pending::channel();
    execute(async move {
        if completer.is_canceled() {
            return;
        }
        completer.complete(future.await);
    });
    pending
}

// Executes an async future without blocking the egui thread
#[cfg(not(target_arch = "wasm32"))]
pub fn execute<F: Future<Output = ()> + Send + 'static>(f: F) {
    std::thread::spawn(move || futures::executor::block_on(f));
}

#[cfg(target_arch = "wasm32")]
pub fn execute<F: Future<Output = ()> + 'static>(f: F) {
    wasm_bindgen_futures::spawn_local(f);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn pending_reports_running_then_ready() {
        let (completer, mut pending) = Pending::channel();
        assert_eq!(pending.poll(), TaskState::Running);
        completer.complete(7u32);
        assert_eq!(pending.poll(), TaskState::Ready(7));
    }

    #[test]
    fn dropped_completer_is_lost() {
        let (completer, mut pending) = Pending::<u32>::channel();
        drop(completer);
        assert_eq!(pending.poll(), TaskState::Lost);
    }

    #[test]
    fn dropping_pending_cancels() {
        let (completer, pending) = Pending::<u32>::channel();
        assert!(!completer.is_canceled());
        drop(pending);
        assert!(completer.is_canceled());
        completer.complete(1);
    }

    #[test]
    fn spawn_delivers_result() {
        let mut pending = spawn(async { 40 + 2 });
        for _ in 0..200 {
            if let TaskState::Ready(value) = pending.poll() {
                assert_eq!(value, 42);
                return;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        panic!("task never completed");
    }
}
