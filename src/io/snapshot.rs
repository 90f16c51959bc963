//! Per-step JSON snapshots.
//!
//! Every step is stored as `<dir>/step_<index:05>.json` holding the estimated
//! positions so far and the `[ATE, ARE, UD]` triple of that step. Metrics that
//! could not be computed are NaN in memory and `null` on disk.

use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use log::debug;
use serde::{Deserialize, Serialize};

use crate::common::{Pose3, SlamResult};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepSnapshot {
    pub step: usize,
    /// Estimated trajectory positions `[x, y, z]`
    pub positions: Vec<[f64; 3]>,
    /// `[ATE, ARE, UD]`
    #[serde(with = "nullable_metrics")]
    pub metrics: [f64; 3],
}

impl StepSnapshot {
    pub fn new(step: usize, poses: &[Pose3], metrics: [f64; 3]) -> Self {
        let positions = poses
            .iter()
            .map(|p| [p.translation.x, p.translation.y, p.translation.z])
            .collect();
        StepSnapshot {
            step,
            positions,
            metrics,
        }
    }
}

mod nullable_metrics {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(metrics: &[f64; 3], serializer: S) -> Result<S::Ok, S::Error> {
        (*metrics).map(|m| m.is_finite().then_some(m)).serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<[f64; 3], D::Error> {
        let metrics = <[Option<f64>; 3]>::deserialize(deserializer)?;
        Ok(metrics.map(|m| m.unwrap_or(f64::NAN)))
    }
}

/// Destination for step snapshots
pub trait SnapshotSink {
    fn record(&mut self, snapshot: &StepSnapshot) -> SlamResult<()>;
}

/// In-memory sink
impl SnapshotSink for Vec<StepSnapshot> {
    fn record(&mut self, snapshot: &StepSnapshot) -> SlamResult<()> {
        self.push(snapshot.clone());
        Ok(())
    }
}

/// Writes one JSON file per step into a directory
#[derive(Debug, Clone)]
pub struct SnapshotWriter {
    dir: PathBuf,
}

impl SnapshotWriter {
    /// Create the writer, creating `dir` if needed
    pub fn new<P: AsRef<Path>>(dir: P) -> SlamResult<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        Ok(SnapshotWriter { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path(&self, step: usize) -> PathBuf {
        self.dir.join(format!("step_{:05}.json", step))
    }

    pub fn write(&self, snapshot: &StepSnapshot) -> SlamResult<PathBuf> {
        let path = self.path(snapshot.step);
        write_json(&path, snapshot)?;
        debug!("wrote snapshot {}", path.display());
        Ok(path)
    }

    pub fn read(&self, step: usize) -> SlamResult<StepSnapshot> {
        let reader = BufReader::new(File::open(self.path(step))?);
        Ok(serde_json::from_reader(reader)?)
    }
}

/// Pretty-print `value` as JSON into `path`, surfacing buffered write errors
pub fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> SlamResult<()> {
    let mut writer = BufWriter::new(File::create(path)?);
    serde_json::to_writer_pretty(&mut writer, value)?;
    writer.flush()?;
    Ok(())
}

impl SnapshotSink for SnapshotWriter {
    fn record(&mut self, snapshot: &StepSnapshot) -> SlamResult<()> {
        self.write(snapshot).map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::{pose_from_translation, SlamError};
    use nalgebra::Vector3;

    #[test]
    fn test_write_and_read_back() {
        let dir = tempfile::tempdir().unwrap();
        let writer = SnapshotWriter::new(dir.path().join("run")).unwrap();
        let poses = vec![
            Pose3::identity(),
            pose_from_translation(&Vector3::new(1.0, 2.0, 3.0)),
        ];
        let snapshot = StepSnapshot::new(3, &poses, [0.5, 1.5, -0.25]);

        let path = writer.write(&snapshot).unwrap();
        assert!(path.ends_with("step_00003.json"));
        assert_eq!(writer.read(3).unwrap(), snapshot);
    }

    #[test]
    fn test_failed_metric_is_null_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let mut writer = SnapshotWriter::new(dir.path()).unwrap();
        writer.record(&StepSnapshot::new(0, &[], [f64::NAN, 0.0, 1.0])).unwrap();

        let raw = std::fs::read_to_string(writer.path(0)).unwrap();
        assert!(raw.contains("null"));
        let back = writer.read(0).unwrap();
        assert!(back.metrics[0].is_nan());
        assert_eq!(back.metrics[1..], [0.0, 1.0]);
    }

    #[test]
    fn test_missing_step() {
        let dir = tempfile::tempdir().unwrap();
        let writer = SnapshotWriter::new(dir.path()).unwrap();
        assert!(matches!(writer.read(9), Err(SlamError::Io(_))));
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_write_json_reports_full_device() {
        let snapshot = StepSnapshot::new(0, &[Pose3::identity()], [0.0; 3]);
        assert!(matches!(
            write_json(Path::new("/dev/full"), &snapshot),
            Err(SlamError::Io(_))
        ));
    }

    #[test]
    fn test_memory_sink() {
        let mut sink: Vec<StepSnapshot> = Vec::new();
        sink.record(&StepSnapshot::new(1, &[Pose3::identity()], [0.0; 3])).unwrap();
        assert_eq!(sink.len(), 1);
        assert_eq!(sink[0].positions, vec![[0.0, 0.0, 0.0]]);
    }
}
