//! Checkpoint manager mapping a trainer onto its on-disk artifacts.

use super::state::{CheckpointRecord, Checkpointable};
use crate::model::{unwrap_model, unwrap_model_mut, Module};
use crate::training::TrainerState;
use crate::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Configuration for checkpoint management.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CheckpointConfig {
    /// Directory holding every artifact of the experiment
    pub save_loc: PathBuf,
    /// Stem shared by the `.ckpt`, `.pth` and `.emb` files
    pub experiment_name: String,
    /// Explicit checkpoint to resume from; takes priority over `resume`
    pub resume_file: Option<PathBuf>,
    /// Resume from the experiment's own checkpoint if it exists
    pub resume: bool,
    /// Embedding to load when the experiment has none of its own
    pub embedding_path: Option<PathBuf>,
    /// Fixed pretrained embedding in use; nothing is saved for it
    pub glove: bool,
}

impl Default for CheckpointConfig {
    fn default() -> Self {
        Self {
            save_loc: PathBuf::from("save"),
            experiment_name: "experiment".to_string(),
            resume_file: None,
            resume: false,
            embedding_path: None,
            glove: true,
        }
    }
}

impl CheckpointConfig {
    /// Create a new config for the given save location and experiment.
    pub fn new(save_loc: impl Into<PathBuf>, experiment_name: impl Into<String>) -> Self {
        Self {
            save_loc: save_loc.into(),
            experiment_name: experiment_name.into(),
            ..Default::default()
        }
    }

    /// Set an explicit checkpoint to resume from.
    pub fn resume_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.resume_file = Some(path.into());
        self
    }

    /// Enable/disable resuming from the experiment checkpoint.
    pub fn resume(mut self, enabled: bool) -> Self {
        self.resume = enabled;
        self
    }

    /// Set the fallback embedding path.
    pub fn embedding_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.embedding_path = Some(path.into());
        self
    }

    /// Mark the embedding as fixed (`true`) or trainable (`false`).
    pub fn glove(mut self, fixed: bool) -> Self {
        self.glove = fixed;
        self
    }

    /// Whether the embedding is trained and therefore persisted.
    pub fn embedding_trainable(&self) -> bool {
        !self.glove
    }
}

/// Paths derived from a save location and an experiment name.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CheckpointPaths {
    /// `<save_loc>/<experiment_name>.ckpt`
    pub checkpoint: PathBuf,
    /// `<save_loc>/<experiment_name>.pth`
    pub final_model: PathBuf,
    /// `<save_loc>/<experiment_name>.emb`
    pub embedding: PathBuf,
}

impl CheckpointPaths {
    pub fn new(save_loc: &Path, experiment_name: &str) -> Self {
        Self {
            checkpoint: save_loc.join(format!("{}.ckpt", experiment_name)),
            final_model: save_loc.join(format!("{}.pth", experiment_name)),
            embedding: save_loc.join(format!("{}.emb", experiment_name)),
        }
    }
}

/// Where a resumed state came from.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ResumeSource {
    /// The explicitly configured resume file
    ResumeFile(PathBuf),
    /// The experiment's own checkpoint
    Experiment(PathBuf),
}

impl ResumeSource {
    pub fn path(&self) -> &Path {
        match self {
            ResumeSource::ResumeFile(p) | ResumeSource::Experiment(p) => p,
        }
    }
}

/// State read back from disk, ready to be applied to a trainer.
#[derive(Clone, Debug)]
pub struct ResumeState {
    /// File the record was read from
    pub source: ResumeSource,
    /// Decoded checkpoint record
    pub record: CheckpointRecord,
    /// Embedding artifact, when one was found
    pub embedding: Option<Vec<u8>>,
}

impl ResumeState {
    /// Inject the resumed state into a trainer.
    ///
    /// Model parameters go to the unwrapped model, then the optimizer,
    /// epoch, early-stopping fields and embedding are replaced.
    pub fn apply<T: TrainerState + ?Sized>(self, trainer: &mut T) -> Result<()> {
        unwrap_model_mut(trainer.model_mut())?.load_state_dict(&self.record.model)?;
        trainer
            .optimizer_mut()
            .load_state_dict(&self.record.optimizer)?;
        trainer.set_current_epoch(self.record.current_epoch);
        trainer.set_early_stopping_state(self.record.early_stopping());

        if let Some(data) = &self.embedding {
            trainer.embedding_mut().load_state(data)?;
        }

        tracing::info!(
            path = %self.source.path().display(),
            epoch = self.record.current_epoch,
            best_epoch = self.record.best_epoch,
            "Checkpoint loaded"
        );
        Ok(())
    }
}

/// Maps trainer state to and from the experiment's artifacts.
///
/// Directories are created lazily on the first write. Optional inputs
/// (resume file, embeddings) that do not exist are skipped.
///
/// # Example
///
/// ```ignore
/// let config = CheckpointConfig::new("./save", "cola")
///     .resume(true)
///     .glove(false);
/// let manager = CheckpointManager::new(config);
///
/// manager.resume(&mut trainer)?;
/// for epoch in trainer.current_epoch()..max_epochs {
///     // ... train ...
///     manager.save(&trainer)?;
/// }
/// manager.finalize(&trainer)?;
/// ```
pub struct CheckpointManager {
    config: CheckpointConfig,
    paths: CheckpointPaths,
}

impl CheckpointManager {
    /// Create a new checkpoint manager.
    pub fn new(config: CheckpointConfig) -> Self {
        let paths = CheckpointPaths::new(&config.save_loc, &config.experiment_name);
        Self { config, paths }
    }

    pub fn config(&self) -> &CheckpointConfig {
        &self.config
    }

    pub fn paths(&self) -> &CheckpointPaths {
        &self.paths
    }

    /// Pick the checkpoint to resume from.
    ///
    /// The explicit resume file wins over the experiment checkpoint; the
    /// experiment checkpoint is only considered when resuming is enabled.
    pub fn resolve_resume_source(&self) -> Option<ResumeSource> {
        if let Some(file) = &self.config.resume_file {
            if file.exists() {
                return Some(ResumeSource::ResumeFile(file.clone()));
            }
            tracing::debug!(path = %file.display(), "Resume file not found, skipping");
        }

        if self.config.resume && self.paths.checkpoint.exists() {
            return Some(ResumeSource::Experiment(self.paths.checkpoint.clone()));
        }

        None
    }

    /// Read the resumable state, without touching any trainer.
    ///
    /// Returns `None` when there is nothing to resume from.
    pub fn load_state_dict(&self) -> Result<Option<ResumeState>> {
        let source = match self.resolve_resume_source() {
            Some(source) => source,
            None => return Ok(None),
        };

        tracing::info!(path = %source.path().display(), "Loading checkpoint");
        let record = Self::read_record(source.path())?;
        if record.version != crate::VERSION {
            tracing::debug!(version = %record.version, "Checkpoint written by another version");
        }

        let embedding = match source {
            ResumeSource::Experiment(_) => self.load_embedding()?,
            ResumeSource::ResumeFile(_) => None,
        };

        Ok(Some(ResumeState {
            source,
            record,
            embedding,
        }))
    }

    /// Load and apply the resumable state in one step.
    ///
    /// Returns the source used, or `None` if the trainer was left untouched.
    pub fn resume<T: TrainerState + ?Sized>(&self, trainer: &mut T) -> Result<Option<ResumeSource>> {
        match self.load_state_dict()? {
            Some(state) => {
                let source = state.source.clone();
                state.apply(trainer)?;
                Ok(Some(source))
            }
            None => Ok(None),
        }
    }

    /// Write the full checkpoint record, then the embedding.
    pub fn save<T: TrainerState + ?Sized>(&self, trainer: &T) -> Result<PathBuf> {
        let record = CheckpointRecord::capture(trainer);
        write_artifact(&self.paths.checkpoint, &record.to_bytes()?)?;
        tracing::info!(
            path = %self.paths.checkpoint.display(),
            epoch = record.current_epoch,
            "Saved checkpoint"
        );

        self.save_embedding(trainer.embedding())?;
        Ok(self.paths.checkpoint.clone())
    }

    /// Reload only the model parameters from the experiment checkpoint.
    ///
    /// Returns true if the checkpoint existed and was loaded.
    pub fn restore(&self, model: &mut dyn Module) -> Result<bool> {
        if !self.paths.checkpoint.exists() {
            tracing::debug!(path = %self.paths.checkpoint.display(), "No checkpoint to restore");
            return Ok(false);
        }

        let record = Self::read_record(&self.paths.checkpoint)?;
        unwrap_model_mut(model)?.load_state_dict(&record.model)?;
        tracing::info!(path = %self.paths.checkpoint.display(), "Restored model weights");
        Ok(true)
    }

    /// Write the final model artifact, then the embedding.
    pub fn finalize<T: TrainerState + ?Sized>(&self, trainer: &T) -> Result<PathBuf> {
        let model = unwrap_model(trainer.model());
        write_artifact(&self.paths.final_model, &model.save_state()?)?;
        tracing::info!(path = %self.paths.final_model.display(), "Saved final model");

        self.save_embedding(trainer.embedding())?;
        Ok(self.paths.final_model.clone())
    }

    /// Persist the embedding if it is trainable.
    ///
    /// Returns true if a file was written.
    pub fn save_embedding(&self, embedding: &dyn Checkpointable) -> Result<bool> {
        if !self.config.embedding_trainable() {
            return Ok(false);
        }

        write_artifact(&self.paths.embedding, &embedding.save_state()?)?;
        tracing::debug!(path = %self.paths.embedding.display(), "Saved embedding");
        Ok(true)
    }

    /// Decode a checkpoint record from any file.
    pub fn read_record(path: impl AsRef<Path>) -> Result<CheckpointRecord> {
        let data = fs::read(path.as_ref())?;
        CheckpointRecord::from_bytes(&data)
    }

    /// Experiment embedding first, then the configured override.
    fn load_embedding(&self) -> Result<Option<Vec<u8>>> {
        if self.paths.embedding.exists() {
            tracing::info!(path = %self.paths.embedding.display(), "Loading embedding");
            return Ok(Some(fs::read(&self.paths.embedding)?));
        }

        if let Some(path) = &self.config.embedding_path {
            if path.exists() {
                tracing::info!(path = %path.display(), "Loading embedding override");
                return Ok(Some(fs::read(path)?));
            }
        }

        tracing::debug!("No embedding found, keeping current one");
        Ok(None)
    }
}

/// Write `data` to `path` through a temporary sibling, creating the parent
/// directory if it is missing.
fn write_artifact(path: &Path, data: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent)?;
            tracing::debug!(dir = %parent.display(), "Created save directory");
        }
    }

    let mut tmp_name = path.file_name().unwrap_or_default().to_os_string();
    tmp_name.push(".tmp");
    let tmp_path = path.with_file_name(tmp_name);

    fs::write(&tmp_path, data)?;
    if let Err(e) = fs::rename(&tmp_path, path) {
        if let Err(cleanup) = fs::remove_file(&tmp_path) {
            tracing::warn!(path = %tmp_path.display(), "Failed to remove temporary file: {}", cleanup);
        }
        return Err(e.into());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checkpoint::{float_entry, StateDict, StateValue, Stateful};
    use crate::training::EarlyStoppingState;
    use crate::AcceptabilityError;
    use std::collections::BTreeMap;
    use tempfile::tempdir;

    /// Model holding a single scalar weight
    #[derive(Default)]
    struct MockModel {
        weight: f64,
    }

    impl Stateful for MockModel {
        fn state_dict(&self) -> StateDict {
            let mut state = StateDict::new();
            state.insert("weight".into(), StateValue::Float(self.weight));
            state
        }

        fn load_state_dict(&mut self, state: &StateDict) -> crate::Result<()> {
            self.weight = float_entry(state, "weight")?;
            Ok(())
        }
    }

    impl Checkpointable for MockModel {
        fn save_state(&self) -> crate::Result<Vec<u8>> {
            Ok(self.weight.to_le_bytes().to_vec())
        }

        fn load_state(&mut self, _data: &[u8]) -> crate::Result<()> {
            Ok(())
        }
    }

    impl Module for MockModel {}

    /// Replication wrapper exposing its inner model
    struct MockParallel {
        module: MockModel,
    }

    impl Stateful for MockParallel {
        fn state_dict(&self) -> StateDict {
            self.module
                .state_dict()
                .into_iter()
                .map(|(k, v)| (format!("module.{}", k), v))
                .collect()
        }

        fn load_state_dict(&mut self, _state: &StateDict) -> crate::Result<()> {
            Err(AcceptabilityError::InvalidState("wrapper".into()))
        }
    }

    impl Checkpointable for MockParallel {
        fn save_state(&self) -> crate::Result<Vec<u8>> {
            Err(AcceptabilityError::InvalidState("wrapper".into()))
        }

        fn load_state(&mut self, _data: &[u8]) -> crate::Result<()> {
            Err(AcceptabilityError::InvalidState("wrapper".into()))
        }
    }

    impl Module for MockParallel {
        fn inner_module(&self) -> Option<&dyn Module> {
            Some(&self.module)
        }

        fn inner_module_mut(&mut self) -> Option<&mut dyn Module> {
            Some(&mut self.module)
        }
    }

    #[derive(Default)]
    struct MockOptimizer {
        lr: f64,
    }

    impl Stateful for MockOptimizer {
        fn state_dict(&self) -> StateDict {
            let mut state = StateDict::new();
            state.insert("lr".into(), StateValue::Float(self.lr));
            state
        }

        fn load_state_dict(&mut self, state: &StateDict) -> crate::Result<()> {
            self.lr = float_entry(state, "lr")?;
            Ok(())
        }
    }

    #[derive(Default)]
    struct MockEmbedding {
        data: Vec<u8>,
    }

    impl Checkpointable for MockEmbedding {
        fn save_state(&self) -> crate::Result<Vec<u8>> {
            Ok(self.data.clone())
        }

        fn load_state(&mut self, data: &[u8]) -> crate::Result<()> {
            self.data = data.to_vec();
            Ok(())
        }
    }

    struct MockTrainer<M: Module> {
        model: M,
        optimizer: MockOptimizer,
        epoch: u64,
        early_stopping: EarlyStoppingState,
        embedding: MockEmbedding,
    }

    impl<M: Module> TrainerState for MockTrainer<M> {
        fn model(&self) -> &dyn Module {
            &self.model
        }
        fn model_mut(&mut self) -> &mut dyn Module {
            &mut self.model
        }
        fn optimizer(&self) -> &dyn Stateful {
            &self.optimizer
        }
        fn optimizer_mut(&mut self) -> &mut dyn Stateful {
            &mut self.optimizer
        }
        fn current_epoch(&self) -> u64 {
            self.epoch
        }
        fn set_current_epoch(&mut self, epoch: u64) {
            self.epoch = epoch;
        }
        fn early_stopping_state(&self) -> EarlyStoppingState {
            self.early_stopping.clone()
        }
        fn set_early_stopping_state(&mut self, state: EarlyStoppingState) {
            self.early_stopping = state;
        }
        fn embedding(&self) -> &dyn Checkpointable {
            &self.embedding
        }
        fn embedding_mut(&mut self) -> &mut dyn Checkpointable {
            &mut self.embedding
        }
    }

    fn fresh_trainer() -> MockTrainer<MockModel> {
        MockTrainer {
            model: MockModel::default(),
            optimizer: MockOptimizer::default(),
            epoch: 0,
            early_stopping: EarlyStoppingState::default(),
            embedding: MockEmbedding::default(),
        }
    }

    fn trained_trainer(weight: f64, epoch: u64) -> MockTrainer<MockModel> {
        let mut other_metrics = BTreeMap::new();
        other_metrics.insert("mcc".to_string(), 0.31);
        MockTrainer {
            model: MockModel { weight },
            optimizer: MockOptimizer { lr: 0.01 },
            epoch,
            early_stopping: EarlyStoppingState {
                best_monitored_metric: 0.25,
                best_monitored_epoch: epoch - 1,
                other_metrics,
            },
            embedding: MockEmbedding {
                data: vec![4, 2],
            },
        }
    }

    #[test]
    fn test_config_builder() {
        let config = CheckpointConfig::new("./save", "cola")
            .resume_file("other.ckpt")
            .resume(true)
            .embedding_path("glove.emb")
            .glove(false);

        assert_eq!(config.save_loc, PathBuf::from("./save"));
        assert_eq!(config.experiment_name, "cola");
        assert_eq!(config.resume_file, Some(PathBuf::from("other.ckpt")));
        assert!(config.resume);
        assert_eq!(config.embedding_path, Some(PathBuf::from("glove.emb")));
        assert!(config.embedding_trainable());
    }

    #[test]
    fn test_config_defaults_from_partial_json() {
        let config: CheckpointConfig =
            serde_json::from_str(r#"{"experiment_name": "cola"}"#).unwrap();

        assert_eq!(config.experiment_name, "cola");
        assert_eq!(config.save_loc, PathBuf::from("save"));
        assert!(config.resume_file.is_none());
        assert!(!config.resume);
        assert!(config.glove);
    }

    #[test]
    fn test_paths_use_fixed_suffixes() {
        let paths = CheckpointPaths::new(Path::new("out"), "run1");

        assert_eq!(paths.checkpoint, PathBuf::from("out/run1.ckpt"));
        assert_eq!(paths.final_model, PathBuf::from("out/run1.pth"));
        assert_eq!(paths.embedding, PathBuf::from("out/run1.emb"));
    }

    #[test]
    fn test_no_source_leaves_trainer_untouched() {
        let dir = tempdir().unwrap();
        let config = CheckpointConfig::new(dir.path(), "exp").resume(true);
        let manager = CheckpointManager::new(config);

        let mut trainer = fresh_trainer();
        assert!(manager.resume(&mut trainer).unwrap().is_none());

        assert_eq!(trainer.epoch, 0);
        assert_eq!(trainer.model.weight, 0.0);
        assert_eq!(trainer.early_stopping, EarlyStoppingState::default());
    }

    #[test]
    fn test_resume_flag_required_for_experiment_checkpoint() {
        let dir = tempdir().unwrap();
        let manager = CheckpointManager::new(CheckpointConfig::new(dir.path(), "exp"));
        manager.save(&trained_trainer(1.5, 4)).unwrap();

        assert!(manager.resolve_resume_source().is_none());
    }

    #[test]
    fn test_save_and_resume() {
        let dir = tempdir().unwrap();
        let config = CheckpointConfig::new(dir.path(), "exp").resume(true);
        let manager = CheckpointManager::new(config);

        let trained = trained_trainer(1.5, 4);
        let path = manager.save(&trained).unwrap();
        assert_eq!(path, dir.path().join("exp.ckpt"));

        let mut trainer = fresh_trainer();
        let source = manager.resume(&mut trainer).unwrap();

        assert_eq!(source, Some(ResumeSource::Experiment(path)));
        assert_eq!(trainer.model.weight, 1.5);
        assert_eq!(trainer.optimizer.lr, 0.01);
        assert_eq!(trainer.epoch, 4);
        assert_eq!(trainer.early_stopping, trained.early_stopping);
    }

    #[test]
    fn test_resume_file_takes_priority() {
        let dir = tempdir().unwrap();

        let other = CheckpointManager::new(CheckpointConfig::new(dir.path(), "other"));
        let resume_file = other.save(&trained_trainer(7.0, 9)).unwrap();

        let config = CheckpointConfig::new(dir.path(), "exp")
            .resume(true)
            .resume_file(&resume_file);
        let manager = CheckpointManager::new(config);
        manager.save(&trained_trainer(1.0, 2)).unwrap();

        let mut trainer = fresh_trainer();
        let source = manager.resume(&mut trainer).unwrap();

        assert_eq!(source, Some(ResumeSource::ResumeFile(resume_file)));
        assert_eq!(trainer.model.weight, 7.0);
        assert_eq!(trainer.epoch, 9);
    }

    #[test]
    fn test_missing_resume_file_falls_back_to_experiment() {
        let dir = tempdir().unwrap();
        let config = CheckpointConfig::new(dir.path(), "exp")
            .resume(true)
            .resume_file(dir.path().join("missing.ckpt"));
        let manager = CheckpointManager::new(config);
        manager.save(&trained_trainer(3.0, 5)).unwrap();

        assert_eq!(
            manager.resolve_resume_source(),
            Some(ResumeSource::Experiment(dir.path().join("exp.ckpt")))
        );
    }

    #[test]
    fn test_embedding_loaded_only_for_experiment_source() {
        let dir = tempdir().unwrap();
        let config = CheckpointConfig::new(dir.path(), "exp")
            .resume(true)
            .glove(false);
        let manager = CheckpointManager::new(config.clone());
        manager.save(&trained_trainer(1.0, 2)).unwrap();
        assert!(dir.path().join("exp.emb").exists());

        let state = manager.load_state_dict().unwrap().unwrap();
        assert_eq!(state.embedding, Some(vec![4, 2]));

        let resume_file = CheckpointManager::new(config.resume_file(dir.path().join("exp.ckpt")));
        let state = resume_file.load_state_dict().unwrap().unwrap();
        assert!(matches!(state.source, ResumeSource::ResumeFile(_)));
        assert!(state.embedding.is_none());
    }

    #[test]
    fn test_embedding_override_used_as_fallback() {
        let dir = tempdir().unwrap();
        let override_path = dir.path().join("pretrained.emb");
        fs::write(&override_path, [9u8, 9, 9]).unwrap();

        let config = CheckpointConfig::new(dir.path(), "exp")
            .resume(true)
            .embedding_path(&override_path);
        let manager = CheckpointManager::new(config);
        // glove defaults to true, so no experiment embedding is written
        manager.save(&trained_trainer(1.0, 2)).unwrap();
        assert!(!dir.path().join("exp.emb").exists());

        let mut trainer = fresh_trainer();
        manager.resume(&mut trainer).unwrap();
        assert_eq!(trainer.embedding.data, vec![9, 9, 9]);
    }

    #[test]
    fn test_save_embedding_respects_glove_flag() {
        let dir = tempdir().unwrap();
        let embedding = MockEmbedding { data: vec![1, 2, 3] };

        let fixed = CheckpointManager::new(CheckpointConfig::new(dir.path(), "fixed"));
        assert!(!fixed.save_embedding(&embedding).unwrap());
        assert!(!dir.path().join("fixed.emb").exists());

        let trainable =
            CheckpointManager::new(CheckpointConfig::new(dir.path(), "trainable").glove(false));
        assert!(trainable.save_embedding(&embedding).unwrap());
        assert_eq!(fs::read(dir.path().join("trainable.emb")).unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn test_directories_created_lazily() {
        let dir = tempdir().unwrap();
        let save_loc = dir.path().join("nested").join("save");
        let manager = CheckpointManager::new(CheckpointConfig::new(&save_loc, "exp").glove(false));

        assert!(!save_loc.exists());
        manager.finalize(&trained_trainer(2.0, 3)).unwrap();

        assert!(save_loc.join("exp.pth").exists());
        assert!(save_loc.join("exp.emb").exists());
        assert!(!save_loc.join("exp.pth.tmp").exists());
    }

    #[test]
    fn test_finalize_writes_unwrapped_model() {
        let dir = tempdir().unwrap();
        let manager = CheckpointManager::new(CheckpointConfig::new(dir.path(), "exp"));

        let plain = trained_trainer(2.5, 3);
        let wrapped = MockTrainer {
            model: MockParallel {
                module: MockModel { weight: 2.5 },
            },
            optimizer: MockOptimizer { lr: 0.01 },
            epoch: 3,
            early_stopping: plain.early_stopping.clone(),
            embedding: MockEmbedding::default(),
        };

        let path = manager.finalize(&wrapped).unwrap();
        assert_eq!(fs::read(&path).unwrap(), 2.5f64.to_le_bytes().to_vec());
        assert!(!dir.path().join("exp.emb").exists());
    }

    #[test]
    fn test_wrapped_and_plain_records_identical() {
        let dir = tempdir().unwrap();
        let plain_manager = CheckpointManager::new(CheckpointConfig::new(dir.path(), "plain"));
        let wrapped_manager = CheckpointManager::new(CheckpointConfig::new(dir.path(), "wrapped"));

        let plain = trained_trainer(0.5, 6);
        let wrapped = MockTrainer {
            model: MockParallel {
                module: MockModel { weight: 0.5 },
            },
            optimizer: MockOptimizer { lr: 0.01 },
            epoch: 6,
            early_stopping: plain.early_stopping.clone(),
            embedding: MockEmbedding::default(),
        };

        let a = plain_manager.save(&plain).unwrap();
        let b = wrapped_manager.save(&wrapped).unwrap();

        assert_eq!(fs::read(a).unwrap(), fs::read(b).unwrap());
    }

    #[test]
    fn test_resume_into_wrapped_model() {
        let dir = tempdir().unwrap();
        let manager = CheckpointManager::new(CheckpointConfig::new(dir.path(), "exp").resume(true));
        manager.save(&trained_trainer(8.0, 2)).unwrap();

        let mut wrapped = MockTrainer {
            model: MockParallel {
                module: MockModel::default(),
            },
            optimizer: MockOptimizer::default(),
            epoch: 0,
            early_stopping: EarlyStoppingState::default(),
            embedding: MockEmbedding::default(),
        };
        manager.resume(&mut wrapped).unwrap();

        assert_eq!(wrapped.model.module.weight, 8.0);
    }

    #[test]
    fn test_restore_loads_weights_only() {
        let dir = tempdir().unwrap();
        let manager = CheckpointManager::new(CheckpointConfig::new(dir.path(), "exp"));

        let mut model = MockModel::default();
        assert!(!manager.restore(&mut model).unwrap());

        manager.save(&trained_trainer(4.0, 5)).unwrap();
        assert!(manager.restore(&mut model).unwrap());
        assert_eq!(model.weight, 4.0);
    }

    /// Wrapper that exposes its inner model read-only
    struct ReadOnlyWrapper {
        module: MockModel,
    }

    impl Stateful for ReadOnlyWrapper {
        fn state_dict(&self) -> StateDict {
            self.module.state_dict()
        }

        fn load_state_dict(&mut self, state: &StateDict) -> crate::Result<()> {
            self.module.load_state_dict(state)
        }
    }

    impl Checkpointable for ReadOnlyWrapper {
        fn save_state(&self) -> crate::Result<Vec<u8>> {
            self.module.save_state()
        }

        fn load_state(&mut self, data: &[u8]) -> crate::Result<()> {
            self.module.load_state(data)
        }
    }

    impl Module for ReadOnlyWrapper {
        fn inner_module(&self) -> Option<&dyn Module> {
            Some(&self.module)
        }
    }

    #[test]
    fn test_wrapper_without_mutable_inner_is_an_error() {
        let dir = tempdir().unwrap();
        let manager = CheckpointManager::new(CheckpointConfig::new(dir.path(), "exp").resume(true));
        manager.save(&trained_trainer(2.5, 3)).unwrap();

        let mut model = ReadOnlyWrapper {
            module: MockModel::default(),
        };
        let err = manager.restore(&mut model).unwrap_err();
        assert!(matches!(err, AcceptabilityError::InvalidState(_)));
        assert_eq!(model.module.weight, 0.0);

        let mut trainer = MockTrainer {
            model: ReadOnlyWrapper {
                module: MockModel::default(),
            },
            optimizer: MockOptimizer::default(),
            epoch: 0,
            early_stopping: EarlyStoppingState::default(),
            embedding: MockEmbedding::default(),
        };
        let err = manager.resume(&mut trainer).unwrap_err();
        assert!(matches!(err, AcceptabilityError::InvalidState(_)));
        assert_eq!(trainer.epoch, 0);
    }

    #[test]
    fn test_failed_rename_removes_temporary_file() {
        let dir = tempdir().unwrap();
        let manager = CheckpointManager::new(CheckpointConfig::new(dir.path(), "exp"));
        // A non-empty directory cannot be replaced by a file.
        let blocker = dir.path().join("exp.ckpt");
        fs::create_dir(&blocker).unwrap();
        fs::write(blocker.join("keep"), b"x").unwrap();

        let err = manager.save(&trained_trainer(1.0, 1)).unwrap_err();
        assert!(matches!(err, AcceptabilityError::Io(_)));
        assert!(!dir.path().join("exp.ckpt.tmp").exists());
        assert!(blocker.join("keep").exists());
    }

    #[test]
    fn test_corrupt_checkpoint_propagates_error() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("exp.ckpt"), [1u8, 2, 3]).unwrap();
        let manager = CheckpointManager::new(CheckpointConfig::new(dir.path(), "exp").resume(true));

        let err = manager.load_state_dict().unwrap_err();
        assert!(matches!(err, AcceptabilityError::Serialization(_)));
    }
}
