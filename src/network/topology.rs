use super::InterfaceStatus;

/// Read-only view of the local interfaces supplied by the host.
pub trait Topology {
    fn interfaces(&self) -> Vec<InterfaceStatus>;

    /// Output queue fill ratio of `iface`, in `[0, 1]`.
    fn queue_occupancy(&self, iface: &str) -> f64;

    fn is_up(&self, iface: &str) -> bool {
        self.interfaces().iter().any(|i| i.name == iface && i.up)
    }

    /// Mean queue occupancy over the interfaces that are up.
    fn mean_occupancy(&self) -> f64 {
        let up: Vec<InterfaceStatus> = self.interfaces().into_iter().filter(|i| i.up).collect();
        if up.is_empty() {
            return 0.0;
        }
        let total: f64 = up.iter().map(|i| self.queue_occupancy(&i.name).clamp(0.0, 1.0)).sum();
        total / up.len() as f64
    }
}
