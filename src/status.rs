/// Consumes connected-gateway-count transitions.
///
/// Implementations are invoked synchronously from the connection lifecycle
/// hooks, so they should not block; a slow listener delays the caller that
/// opened or closed a connection.
pub trait ClusterConnectionStatusListener: Send + Sync {
    /// Fired on every change to the open-connection count, carrying the new
    /// and previous values.
    fn gateway_count_changed(&self, new_count: usize, old_count: usize);

    /// Fired once, exactly when the open-connection count drops to zero.
    fn cluster_connection_lost(&self);
}

/// A listener that does nothing, for callers that don't care about
/// connection-count transitions.
#[derive(Default, Clone, Copy)]
pub struct NullStatusListener;

impl ClusterConnectionStatusListener for NullStatusListener {
    fn gateway_count_changed(&self, _new_count: usize, _old_count: usize) {}
    fn cluster_connection_lost(&self) {}
}
