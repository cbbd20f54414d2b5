//! Typed connectors between modules.
//!
//! A [`Connector`] is a named input or output port of a module transporting
//! one dataset type. Outputs store the dataset they currently publish; inputs
//! read it from the output they are connected to. An input accepts a single
//! connection, an output any number of them.
//!
//! Every connector owns a `data_changed` condition. Inputs fire it whenever
//! the data they see may have changed: the connected output published new
//! data, a connection was made to an output that already has data, or the
//! connection went away. Modules add the condition of each input to their wait
//! set and re-read the input after waking.
//!
//! The typed wrappers [`InputData`] and [`OutputData`] are what module authors
//! hold on to.

use std::fmt;
use std::marker::PhantomData;
use std::sync::{Arc, Weak};

use parking_lot::RwLock;
use walnut_core::{Condition, Signal};

use crate::dataset::{AnyData, DataType};
use crate::error::{KernelError, KernelResult};

/// Whether a connector consumes or produces data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectorDirection {
    Input,
    Output,
}

/// Arguments of the connection signals: canonical names of the output and the
/// input connector.
pub type ConnectionEvent = (String, String);

/// A typed port of a module.
pub struct Connector {
    name: String,
    description: String,
    module_name: String,
    direction: ConnectorDirection,
    data_type: DataType,
    capacity: Option<usize>,
    connections: RwLock<Vec<Weak<Connector>>>,
    data: RwLock<Option<AnyData>>,
    data_changed: Condition,
    connection_established: Signal<ConnectionEvent>,
    connection_closed: Signal<ConnectionEvent>,
}

impl Connector {
    /// Create a connector belonging to the module named `module_name`.
    pub fn new(
        module_name: impl Into<String>,
        name: impl Into<String>,
        description: impl Into<String>,
        direction: ConnectorDirection,
        data_type: DataType,
    ) -> Arc<Self> {
        let capacity = match direction {
            ConnectorDirection::Input => Some(1),
            ConnectorDirection::Output => None,
        };
        Arc::new(Self {
            name: name.into(),
            description: description.into(),
            module_name: module_name.into(),
            direction,
            data_type,
            capacity,
            connections: RwLock::new(Vec::new()),
            data: RwLock::new(None),
            data_changed: Condition::new(),
            connection_established: Signal::new(),
            connection_closed: Signal::new(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn module_name(&self) -> &str {
        &self.module_name
    }

    /// `"<module>:<connector>"`, used in logs and errors.
    pub fn canonical_name(&self) -> String {
        format!("{}:{}", self.module_name, self.name)
    }

    pub fn direction(&self) -> ConnectorDirection {
        self.direction
    }

    pub fn is_input(&self) -> bool {
        self.direction == ConnectorDirection::Input
    }

    pub fn is_output(&self) -> bool {
        self.direction == ConnectorDirection::Output
    }

    pub fn data_type(&self) -> DataType {
        self.data_type
    }

    /// Maximum number of simultaneous connections, `None` if unbounded.
    pub fn capacity(&self) -> Option<usize> {
        self.capacity
    }

    /// Fired whenever the data visible through this connector may have changed.
    pub fn data_changed(&self) -> &Condition {
        &self.data_changed
    }

    /// Emitted on both ends after a connection was made.
    pub fn connection_established(&self) -> &Signal<ConnectionEvent> {
        &self.connection_established
    }

    /// Emitted on both ends after a connection was removed.
    pub fn connection_closed(&self) -> &Signal<ConnectionEvent> {
        &self.connection_closed
    }

    /// Check whether `self` and `other` could be connected, ignoring capacity.
    pub fn check_compatible(&self, other: &Connector) -> KernelResult<()> {
        let (from, to) = (self.canonical_name(), other.canonical_name());
        if self.direction == other.direction {
            return Err(KernelError::incompatible(
                from,
                to,
                "both connectors have the same direction",
            ));
        }
        if !self.data_type.is_compatible_with(&other.data_type) {
            return Err(KernelError::incompatible(
                from,
                to,
                format!(
                    "data type {} does not match {}",
                    self.data_type, other.data_type
                ),
            ));
        }
        Ok(())
    }

    /// Whether `self` and `other` could be connected, ignoring capacity.
    pub fn is_compatible(&self, other: &Connector) -> bool {
        self.check_compatible(other).is_ok()
    }

    /// Connect this connector to `other`. The direction decides which end is
    /// the output; the call may be made on either end.
    ///
    /// Connecting two connectors that are already connected is a no-op.
    #[tracing::instrument(skip_all, target = "walnut_kernel::connector", level = "trace")]
    pub fn connect(self: &Arc<Self>, other: &Arc<Connector>) -> KernelResult<()> {
        self.check_compatible(other)?;
        let (output, input) = if self.is_output() {
            (self, other)
        } else {
            (other, self)
        };

        {
            // Outputs are always locked before inputs.
            let mut out_connections = output.connections.write();
            let mut in_connections = input.connections.write();
            prune(&mut out_connections);
            prune(&mut in_connections);

            if contains(&out_connections, input) {
                return Ok(());
            }
            for (connector, connections) in [(output, &out_connections), (input, &in_connections)] {
                if let Some(capacity) = connector.capacity
                    && connections.len() >= capacity
                {
                    return Err(KernelError::ConnectorCapacityExceeded {
                        connector: connector.canonical_name(),
                        capacity,
                    });
                }
            }

            out_connections.push(Arc::downgrade(input));
            in_connections.push(Arc::downgrade(output));
        }

        tracing::debug!(
            target: "walnut_kernel::connector",
            from = %output.canonical_name(),
            to = %input.canonical_name(),
            "connection established"
        );

        let event = (output.canonical_name(), input.canonical_name());
        output.connection_established.emit(event.clone());
        input.connection_established.emit(event);

        if output.data.read().is_some() {
            input.data_changed.notify();
        }
        Ok(())
    }

    /// Remove the connection between `self` and `other`.
    ///
    /// Returns `false` if they were not connected.
    pub fn disconnect(&self, other: &Connector) -> bool {
        let (output, input) = if self.is_output() {
            (self, other)
        } else {
            (other, self)
        };
        if output.direction == input.direction {
            return false;
        }

        let removed = {
            let mut out_connections = output.connections.write();
            let mut in_connections = input.connections.write();
            let before = out_connections.len();
            out_connections.retain(|c| !points_to(c, input));
            in_connections.retain(|c| !points_to(c, output));
            out_connections.len() != before
        };
        if !removed {
            return false;
        }

        tracing::debug!(
            target: "walnut_kernel::connector",
            from = %output.canonical_name(),
            to = %input.canonical_name(),
            "connection closed"
        );

        let event = (output.canonical_name(), input.canonical_name());
        output.connection_closed.emit(event.clone());
        input.connection_closed.emit(event);
        input.data_changed.notify();
        true
    }

    /// Remove every connection of this connector.
    pub fn disconnect_all(&self) {
        for other in self.connected() {
            self.disconnect(&other);
        }
    }

    /// The connectors currently connected to this one.
    pub fn connected(&self) -> Vec<Arc<Connector>> {
        self.connections
            .read()
            .iter()
            .filter_map(Weak::upgrade)
            .collect()
    }

    pub fn is_connected(&self) -> bool {
        self.connections
            .read()
            .iter()
            .any(|c| c.strong_count() > 0)
    }

    pub fn is_connected_to(&self, other: &Connector) -> bool {
        self.connections.read().iter().any(|c| points_to(c, other))
    }

    /// Publish new data on an output and notify every connected input.
    ///
    /// Has no effect on inputs.
    pub fn update_data(&self, data: Option<AnyData>) {
        if !self.is_output() {
            tracing::warn!(
                target: "walnut_kernel::connector",
                connector = %self.canonical_name(),
                "update_data called on an input connector"
            );
            return;
        }
        *self.data.write() = data;
        self.data_changed.notify();
        for input in self.connected() {
            input.data_changed.notify();
        }
    }

    /// The data visible through this connector: the published data for an
    /// output, the connected output's data for an input.
    pub fn data(&self) -> Option<AnyData> {
        match self.direction {
            ConnectorDirection::Output => self.data.read().clone(),
            ConnectorDirection::Input => self
                .connected()
                .into_iter()
                .find_map(|output| output.data.read().clone()),
        }
    }
}

fn points_to(weak: &Weak<Connector>, target: &Connector) -> bool {
    std::ptr::eq(weak.as_ptr(), target)
}

fn contains(connections: &[Weak<Connector>], target: &Connector) -> bool {
    connections.iter().any(|c| points_to(c, target))
}

fn prune(connections: &mut Vec<Weak<Connector>>) {
    connections.retain(|c| c.strong_count() > 0);
}

impl fmt::Debug for Connector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connector")
            .field("name", &self.canonical_name())
            .field("direction", &self.direction)
            .field("data_type", &self.data_type)
            .field("connections", &self.connections.read().len())
            .finish()
    }
}

/// Typed handle to an input connector.
pub struct InputData<T> {
    connector: Arc<Connector>,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Send + Sync + 'static> InputData<T> {
    pub fn new(
        module_name: impl Into<String>,
        name: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            connector: Connector::new(
                module_name,
                name,
                description,
                ConnectorDirection::Input,
                DataType::of::<T>(),
            ),
            _marker: PhantomData,
        }
    }

    pub fn connector(&self) -> &Arc<Connector> {
        &self.connector
    }

    /// The dataset published by the connected output, if any.
    pub fn get_data(&self) -> Option<Arc<T>> {
        self.connector.data().and_then(|data| data.downcast().ok())
    }

    pub fn data_changed(&self) -> &Condition {
        self.connector.data_changed()
    }
}

impl<T> Clone for InputData<T> {
    fn clone(&self) -> Self {
        Self {
            connector: self.connector.clone(),
            _marker: PhantomData,
        }
    }
}

impl<T> fmt::Debug for InputData<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.connector.fmt(f)
    }
}

/// Typed handle to an output connector.
pub struct OutputData<T> {
    connector: Arc<Connector>,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Send + Sync + 'static> OutputData<T> {
    pub fn new(
        module_name: impl Into<String>,
        name: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            connector: Connector::new(
                module_name,
                name,
                description,
                ConnectorDirection::Output,
                DataType::of::<T>(),
            ),
            _marker: PhantomData,
        }
    }

    pub fn connector(&self) -> &Arc<Connector> {
        &self.connector
    }

    /// Publish `data` to every connected input.
    pub fn update_data(&self, data: Arc<T>) {
        self.connector.update_data(Some(data));
    }

    /// Withdraw the published data.
    pub fn clear_data(&self) {
        self.connector.update_data(None);
    }

    pub fn get_data(&self) -> Option<Arc<T>> {
        self.connector.data().and_then(|data| data.downcast().ok())
    }
}

impl<T> Clone for OutputData<T> {
    fn clone(&self) -> Self {
        Self {
            connector: self.connector.clone(),
            _marker: PhantomData,
        }
    }
}

impl<T> fmt::Debug for OutputData<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.connector.fmt(f)
    }
}

static_assertions::assert_impl_all!(Connector: Send, Sync);
static_assertions::assert_impl_all!(InputData<Vec<f32>>: Send, Sync);

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_connect_and_read_data() {
        let out = OutputData::<Vec<f32>>::new("Source", "out", "");
        let input = InputData::<Vec<f32>>::new("Sink", "in", "");

        out.update_data(Arc::new(vec![1.0, 2.0]));
        let before = input.data_changed().generation();
        out.connector().connect(input.connector()).unwrap();

        assert!(input.data_changed().generation() > before);
        assert_eq!(input.get_data().unwrap().as_slice(), &[1.0, 2.0]);
        assert!(out.connector().is_connected_to(input.connector()));
        assert!(input.connector().is_connected_to(out.connector()));
    }

    #[test]
    fn test_connect_from_input_side() {
        let out = OutputData::<i32>::new("A", "out", "");
        let input = InputData::<i32>::new("B", "in", "");
        input.connector().connect(out.connector()).unwrap();
        out.update_data(Arc::new(3));
        assert_eq!(*input.get_data().unwrap(), 3);
    }

    #[test]
    fn test_incompatible_connections() {
        let out = OutputData::<i32>::new("A", "out", "");
        let other_out = OutputData::<i32>::new("B", "out", "");
        let wrong_type = InputData::<String>::new("C", "in", "");

        assert!(matches!(
            out.connector().connect(other_out.connector()),
            Err(KernelError::ConnectorsIncompatible { .. })
        ));
        assert!(matches!(
            out.connector().connect(wrong_type.connector()),
            Err(KernelError::ConnectorsIncompatible { .. })
        ));
        assert!(!out.connector().is_connected());
    }

    #[test]
    fn test_input_capacity() {
        let a = OutputData::<i32>::new("A", "out", "");
        let b = OutputData::<i32>::new("B", "out", "");
        let input = InputData::<i32>::new("C", "in", "");

        a.connector().connect(input.connector()).unwrap();
        // Reconnecting the same pair is a no-op.
        a.connector().connect(input.connector()).unwrap();
        assert!(matches!(
            b.connector().connect(input.connector()),
            Err(KernelError::ConnectorCapacityExceeded { capacity: 1, .. })
        ));
        assert_eq!(a.connector().connected().len(), 1);
    }

    #[test]
    fn test_output_fans_out() {
        let out = OutputData::<i32>::new("A", "out", "");
        let inputs: Vec<_> = (0..3)
            .map(|i| InputData::<i32>::new(format!("M{i}"), "in", ""))
            .collect();
        for input in &inputs {
            out.connector().connect(input.connector()).unwrap();
        }
        out.update_data(Arc::new(9));
        for input in &inputs {
            assert_eq!(*input.get_data().unwrap(), 9);
        }
    }

    #[test]
    fn test_disconnect_notifies_input() {
        let out = OutputData::<i32>::new("A", "out", "");
        let input = InputData::<i32>::new("B", "in", "");
        out.update_data(Arc::new(1));
        out.connector().connect(input.connector()).unwrap();

        let closed = Arc::new(AtomicUsize::new(0));
        let counter = closed.clone();
        input.connector().connection_closed().connect(move |(from, to)| {
            assert_eq!(from, "A:out");
            assert_eq!(to, "B:in");
            counter.fetch_add(1, Ordering::SeqCst);
        });

        let before = input.data_changed().generation();
        assert!(input.connector().disconnect(out.connector()));
        assert!(!input.connector().disconnect(out.connector()));
        assert!(input.data_changed().generation() > before);
        assert!(input.get_data().is_none());
        assert_eq!(closed.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_dropped_peer_is_forgotten() {
        let out = OutputData::<i32>::new("A", "out", "");
        {
            let input = InputData::<i32>::new("B", "in", "");
            out.connector().connect(input.connector()).unwrap();
            assert!(out.connector().is_connected());
        }
        assert!(!out.connector().is_connected());
        assert!(out.connector().connected().is_empty());
    }
}
