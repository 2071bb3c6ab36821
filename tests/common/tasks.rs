//! Reusable tasks for integration tests

use stagepipe::{DataType, PortDescriptor, Scalar, Task, TaskIo};
use std::sync::{Arc, Mutex};

/// Emits `count` distinct values per worker on `out`, then goes quiet.
///
/// Worker `w` emits `w * STRIDE + 1 ..= w * STRIDE + count`.
#[derive(Clone)]
pub struct SequenceSource {
    count: i64,
    emitted: i64,
}

impl SequenceSource {
    pub const STRIDE: i64 = 1_000_000;

    pub fn new(count: i64) -> Self {
        Self { count, emitted: 0 }
    }

    /// Every value a stage of `n_threads` replicas emits, sorted
    pub fn expected(count: i64, n_threads: usize) -> Vec<i64> {
        (0..n_threads as i64)
            .flat_map(|w| (1..=count).map(move |k| w * Self::STRIDE + k))
            .collect()
    }
}

const SOURCE_PORTS: &[PortDescriptor] = &[PortDescriptor::output("out", DataType::I64)];

impl Task for SequenceSource {
    fn name(&self) -> &str {
        "source"
    }

    fn ports(&self) -> &[PortDescriptor] {
        SOURCE_PORTS
    }

    fn replicate(&self) -> Box<dyn Task> {
        Box::new(self.clone())
    }

    fn exec(&mut self, io: &mut TaskIo<'_>) -> anyhow::Result<()> {
        if self.emitted < self.count {
            self.emitted += 1;
            let value = io.worker() as i64 * Self::STRIDE + self.emitted;
            io.set_output("out", value)?;
        }
        Ok(())
    }
}

/// Records every value received on `in`. Replicas share one log.
pub struct Recorder<T> {
    name: &'static str,
    ports: [PortDescriptor; 1],
    log: Arc<Mutex<Vec<T>>>,
}

impl<T> Clone for Recorder<T> {
    fn clone(&self) -> Self {
        Self {
            name: self.name,
            ports: self.ports.clone(),
            log: Arc::clone(&self.log),
        }
    }
}

impl<T: Scalar> Recorder<T> {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            ports: [PortDescriptor::input("in", T::DATA_TYPE)],
            log: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn len(&self) -> usize {
        self.log.lock().unwrap().len()
    }

    pub fn values(&self) -> Vec<T> {
        self.log.lock().unwrap().clone()
    }

    pub fn clear(&self) {
        self.log.lock().unwrap().clear();
    }
}

impl<T: Scalar> Task for Recorder<T> {
    fn name(&self) -> &str {
        self.name
    }

    fn ports(&self) -> &[PortDescriptor] {
        &self.ports
    }

    fn replicate(&self) -> Box<dyn Task> {
        Box::new(self.clone())
    }

    fn exec(&mut self, io: &mut TaskIo<'_>) -> anyhow::Result<()> {
        if let Some(value) = io.input::<T>("in")? {
            self.log.lock().unwrap().push(value);
        }
        Ok(())
    }
}

/// Converts `in: i64` to `out: f64`, scaled by `factor`.
#[derive(Clone)]
pub struct Scale {
    factor: f64,
}

impl Scale {
    pub fn new(factor: f64) -> Self {
        Self { factor }
    }
}

const SCALE_PORTS: &[PortDescriptor] = &[
    PortDescriptor::input("in", DataType::I64),
    PortDescriptor::output("out", DataType::F64),
];

impl Task for Scale {
    fn name(&self) -> &str {
        "scale"
    }

    fn ports(&self) -> &[PortDescriptor] {
        SCALE_PORTS
    }

    fn replicate(&self) -> Box<dyn Task> {
        Box::new(self.clone())
    }

    fn exec(&mut self, io: &mut TaskIo<'_>) -> anyhow::Result<()> {
        if let Some(value) = io.input::<i64>("in")? {
            io.set_output("out", value as f64 * self.factor)?;
        }
        Ok(())
    }
}

/// Waits on two inputs; tests bind only one so its workers block on the other.
#[derive(Clone)]
pub struct Join2;

const JOIN2_PORTS: &[PortDescriptor] = &[
    PortDescriptor::input("left", DataType::I64),
    PortDescriptor::input("right", DataType::I64),
];

impl Task for Join2 {
    fn name(&self) -> &str {
        "join2"
    }

    fn ports(&self) -> &[PortDescriptor] {
        JOIN2_PORTS
    }

    fn replicate(&self) -> Box<dyn Task> {
        Box::new(self.clone())
    }

    fn exec(&mut self, _io: &mut TaskIo<'_>) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Fails every cycle; used to check that failures are counted, not fatal.
#[derive(Clone)]
pub struct AlwaysFails;

impl Task for AlwaysFails {
    fn name(&self) -> &str {
        "always_fails"
    }

    fn ports(&self) -> &[PortDescriptor] {
        &[]
    }

    fn replicate(&self) -> Box<dyn Task> {
        Box::new(self.clone())
    }

    fn exec(&mut self, _io: &mut TaskIo<'_>) -> anyhow::Result<()> {
        anyhow::bail!("synthetic failure")
    }
}
