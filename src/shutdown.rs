#[derive(Clone, Debug)]
/// Workers hold this until they have finished shutting down; dropping the last
/// copy releases main to exit.
pub struct Shutdown {
    pub(crate) _handle: tokio::sync::mpsc::Sender<()>,
}
