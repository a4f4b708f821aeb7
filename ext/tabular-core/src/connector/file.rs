//! Directory-backed datasets shared by the file formats
//!
//! A dataset directory holds `part-NNNNN-<job>.<ext>` data files, optionally
//! nested under hive-style `col=value` partition directories, plus two
//! metadata files: `_schema.json` describing the logical layout and an
//! empty `_SUCCESS` marker. Writes are staged in a hidden sibling directory
//! and committed with renames.

use crate::error::ErrorContext;
use crate::partition::{infer_partition_type, parse_partition_segment, parse_partition_value, PartitionSpec};
use crate::traits::{Connector, FileFormat, FileReadOptions, FileSink, FileWriteOptions, ReadRequest, ReadSource, RowStream};
use crate::{
    CancellationToken, Dataset, Field, Result, Row, SaveMode, Schema, SchemaRef, TabularError, Value,
    WriteRequest, WriteTarget,
};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Marker written once a dataset directory is fully committed
pub const SUCCESS_MARKER: &str = "_SUCCESS";

/// Layout metadata stored next to the data files
pub const LAYOUT_FILE: &str = "_schema.json";

/// Logical description of a dataset directory
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatasetLayout {
    pub format: String,
    /// Full schema, partition columns included, in logical column order
    pub schema: Schema,
    #[serde(default)]
    pub partition_columns: Vec<String>,
}

impl DatasetLayout {
    /// Load the layout file of `dir`, if there is one
    pub fn load(dir: &Path) -> Result<Option<Self>> {
        let path = dir.join(LAYOUT_FILE);
        if !path.is_file() {
            return Ok(None);
        }
        let raw = fs::read_to_string(&path).with_context(|| format!("reading {}", path.display()))?;
        let layout = serde_json::from_str(&raw).with_context(|| format!("parsing {}", path.display()))?;
        Ok(Some(layout))
    }

    /// Replace the layout file of `dir`
    pub fn store(&self, dir: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        write_atomic(&dir.join(LAYOUT_FILE), json.as_bytes())
    }
}

/// Replace `path` through a hidden temporary file and a rename, so readers
/// never see a partial file
pub(crate) fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    let name = path
        .file_name()
        .ok_or_else(|| TabularError::invalid_argument(format!("invalid file path {}", path.display())))?;
    let tmp = path.with_file_name(format!(".{}.{}", name.to_string_lossy(), Uuid::new_v4()));
    fs::write(&tmp, contents).with_context(|| format!("writing {}", tmp.display()))?;
    if let Err(e) = fs::rename(&tmp, path) {
        if let Err(cleanup) = fs::remove_file(&tmp) {
            warn!(path = %tmp.display(), error = %cleanup, "failed to remove temporary file");
        }
        return Err(e).with_context(|| format!("writing {}", path.display()));
    }
    Ok(())
}

/// Whether a directory entry is metadata or hidden and must not be read
///
/// `_`-prefixed directories still count when they are `col=value`
/// partition segments.
pub(crate) fn is_hidden(name: &str, is_dir: bool) -> bool {
    if name.starts_with('.') {
        return true;
    }
    name.starts_with('_') && !(is_dir && parse_partition_segment(name).is_some())
}

#[derive(Debug, Clone)]
struct DiscoveredFile {
    path: PathBuf,
    /// `(column, raw value)` pairs from the directories above the file
    partitions: Vec<(String, Option<String>)>,
}

fn discover_files(root: &Path) -> Result<Vec<DiscoveredFile>> {
    let mut files = Vec::new();
    walk(root, &mut Vec::new(), &mut files)?;
    Ok(files)
}

fn walk(
    dir: &Path,
    partitions: &mut Vec<(String, Option<String>)>,
    files: &mut Vec<DiscoveredFile>,
) -> Result<()> {
    let mut entries = fs::read_dir(dir)
        .with_context(|| format!("listing {}", dir.display()))?
        .collect::<std::io::Result<Vec<_>>>()
        .with_context(|| format!("listing {}", dir.display()))?;
    entries.sort_by_key(|entry| entry.file_name());

    for entry in entries {
        let name = entry.file_name().to_string_lossy().into_owned();
        let path = entry.path();
        let is_dir = path.is_dir();
        if is_hidden(&name, is_dir) {
            continue;
        }
        if is_dir {
            let segment = parse_partition_segment(&name);
            let pushed = segment.is_some();
            if let Some(segment) = segment {
                partitions.push(segment);
            }
            walk(&path, partitions, files)?;
            if pushed {
                partitions.pop();
            }
        } else {
            files.push(DiscoveredFile {
                path,
                partitions: partitions.clone(),
            });
        }
    }
    Ok(())
}

/// Where a column of the logical schema comes from
#[derive(Debug, Clone, Copy)]
enum ColumnSource {
    Data(usize),
    Partition(usize),
}

#[derive(Debug)]
struct ResolvedFile {
    path: PathBuf,
    partition_values: Vec<Value>,
}

/// Everything a replayed scan needs
struct ScanPlan<F> {
    format: Arc<F>,
    files: Vec<ResolvedFile>,
    data_schema: SchemaRef,
    columns: Vec<ColumnSource>,
    options: FileReadOptions,
}

/// Multi-file row iterator assembling logical rows from data rows and
/// partition values
struct FileRows<F: FileFormat> {
    plan: Arc<ScanPlan<F>>,
    cancel: CancellationToken,
    next_file: usize,
    current_file: usize,
    current: Option<RowStream>,
    done: bool,
}

impl<F: FileFormat> FileRows<F> {
    fn assemble(&self, row: Row) -> Row {
        let mut data = row.into_values();
        let partition_values = &self.plan.files[self.current_file].partition_values;
        self.plan
            .columns
            .iter()
            .map(|column| match *column {
                ColumnSource::Data(idx) => data
                    .get_mut(idx)
                    .map(|value| std::mem::replace(value, Value::Null))
                    .unwrap_or(Value::Null),
                ColumnSource::Partition(idx) => partition_values[idx].clone(),
            })
            .collect()
    }

    fn fail(&mut self, err: TabularError) -> Option<Result<Row>> {
        self.done = true;
        self.current = None;
        Some(Err(err))
    }
}

impl<F: FileFormat> Iterator for FileRows<F> {
    type Item = Result<Row>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        loop {
            if let Err(e) = self.cancel.check() {
                return self.fail(e);
            }

            if let Some(rows) = self.current.as_mut() {
                match rows.next() {
                    Some(Ok(row)) => return Some(Ok(self.assemble(row))),
                    Some(Err(e)) => return self.fail(e),
                    None => self.current = None,
                }
            }

            let Some(file) = self.plan.files.get(self.next_file) else {
                self.done = true;
                return None;
            };
            let opened = self
                .plan
                .format
                .open_rows(&file.path, self.plan.data_schema.clone(), &self.plan.options);
            match opened {
                Ok(rows) => {
                    self.current_file = self.next_file;
                    self.next_file += 1;
                    self.current = Some(rows);
                }
                Err(e) => return self.fail(e),
            }
        }
    }
}

struct OpenSink {
    sink: Box<dyn FileSink>,
    rows: usize,
}

/// Connector storing datasets as directories of `F` files
pub struct FileConnector<F: FileFormat> {
    format: Arc<F>,
}

impl<F: FileFormat> FileConnector<F> {
    pub fn new(format: F) -> Self {
        Self {
            format: Arc::new(format),
        }
    }

    pub fn format(&self) -> &F {
        &self.format
    }

    /// Resolve the logical schema and the per-file partition values of a
    /// dataset location
    fn plan_scan(
        &self,
        root: &Path,
        user_schema: Option<Schema>,
        options: FileReadOptions,
    ) -> Result<(ScanPlan<F>, Schema)> {
        let metadata = fs::metadata(root).with_context(|| format!("reading {}", root.display()))?;

        let (layout, discovered) = if metadata.is_dir() {
            (DatasetLayout::load(root)?, discover_files(root)?)
        } else {
            let file = DiscoveredFile {
                path: root.to_path_buf(),
                partitions: Vec::new(),
            };
            (None, vec![file])
        };

        if let Some(layout) = &layout {
            if layout.format != self.format.name() {
                warn!(
                    path = %root.display(),
                    stored = %layout.format,
                    requested = self.format.name(),
                    "reading dataset with a different format than it was written with"
                );
            }
        }

        let partition_columns: Vec<String> = match &layout {
            Some(layout) => layout.partition_columns.clone(),
            None => discovered
                .first()
                .map(|file| file.partitions.iter().map(|(column, _)| column.clone()).collect())
                .unwrap_or_default(),
        };
        for file in &discovered {
            let found = file.partitions.iter().map(|(column, _)| column.as_str());
            if !found.eq(partition_columns.iter().map(String::as_str)) {
                return Err(TabularError::schema(format!(
                    "conflicting partition directory structure under {}: expected columns [{}] for {}",
                    root.display(),
                    partition_columns.join(", "),
                    file.path.display()
                )));
            }
        }
        debug!(
            path = %root.display(),
            files = discovered.len(),
            partitions = ?partition_columns,
            "discovered data files"
        );

        let schema = match (user_schema, layout) {
            (Some(schema), _) => schema,
            (None, Some(layout)) => apply_binary_as_string(layout.schema, &options),
            (None, None) => {
                let data = self.infer_data_schema(root, &discovered, &options)?;
                let partition_fields = partition_columns
                    .iter()
                    .enumerate()
                    .map(|(idx, column)| {
                        let values = discovered.iter().map(|file| file.partitions[idx].1.as_deref());
                        Field::new(column.clone(), infer_partition_type(values), true)
                    })
                    .collect();
                data.extend(partition_fields)?
            }
        };

        let mut data_fields = Vec::new();
        let columns = schema
            .fields()
            .iter()
            .map(|field| match partition_columns.iter().position(|c| c == field.name()) {
                Some(idx) => ColumnSource::Partition(idx),
                None => {
                    data_fields.push(field.clone());
                    ColumnSource::Data(data_fields.len() - 1)
                }
            })
            .collect();

        let files = discovered
            .into_iter()
            .map(|file| {
                let partition_values = file
                    .partitions
                    .iter()
                    .map(|(column, raw)| match schema.field_with_name(column) {
                        Some(field) => parse_partition_value(raw.as_deref(), field.data_type(), column),
                        None => Ok(Value::Null),
                    })
                    .collect::<Result<Vec<_>>>()?;
                Ok(ResolvedFile {
                    path: file.path,
                    partition_values,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let plan = ScanPlan {
            format: self.format.clone(),
            files,
            data_schema: Arc::new(Schema::new(data_fields)?),
            columns,
            options,
        };
        Ok((plan, schema))
    }

    fn infer_data_schema(&self, root: &Path, files: &[DiscoveredFile], options: &FileReadOptions) -> Result<Schema> {
        let mut inferred: Option<Schema> = None;
        for file in files {
            let Some(schema) = self.format.file_schema(&file.path, options)? else {
                continue;
            };
            inferred = Some(match inferred {
                None => schema,
                Some(current) => current.merge(&schema)?,
            });
            if !options.merge_schema {
                break;
            }
        }
        inferred.ok_or_else(|| {
            TabularError::schema(format!(
                "Unable to infer schema for {} at {}. It must be specified manually",
                self.format.name(),
                root.display()
            ))
        })
    }

    fn write_files(
        &self,
        dataset: &Dataset,
        spec: &PartitionSpec,
        staging: &Path,
        options: &FileWriteOptions,
        job_id: Uuid,
        cancel: &CancellationToken,
    ) -> Result<(usize, usize)> {
        let data_schema = Arc::new(spec.data_schema().clone());
        let mut sinks: IndexMap<PathBuf, OpenSink> = IndexMap::new();
        let mut files = 0usize;
        let mut rows = 0usize;

        for row in dataset.to_rows()? {
            cancel.check()?;
            let (dir, data) = spec.split(row?)?;

            let full = options.max_records_per_file > 0
                && sinks
                    .get(&dir)
                    .is_some_and(|open| open.rows >= options.max_records_per_file);
            if full {
                if let Some(open) = sinks.swap_remove(&dir) {
                    open.sink.finish()?;
                }
            }

            if !sinks.contains_key(&dir) {
                cancel.check()?;
                let sink = self.create_part_file(staging, &dir, files, job_id, data_schema.clone(), options)?;
                files += 1;
                sinks.insert(dir.clone(), OpenSink { sink, rows: 0 });
            }
            let open = sinks
                .get_mut(&dir)
                .ok_or_else(|| TabularError::internal("part file vanished while writing"))?;
            open.sink.write_row(data)?;
            open.rows += 1;
            rows += 1;
        }

        // Unpartitioned datasets always get a data file so the schema
        // survives an empty write
        if files == 0 && spec.is_empty() {
            let sink = self.create_part_file(staging, Path::new(""), files, job_id, data_schema, options)?;
            files += 1;
            sinks.insert(PathBuf::new(), OpenSink { sink, rows: 0 });
        }

        for (_, open) in sinks {
            open.sink.finish()?;
        }
        Ok((files, rows))
    }

    fn create_part_file(
        &self,
        staging: &Path,
        dir: &Path,
        index: usize,
        job_id: Uuid,
        schema: SchemaRef,
        options: &FileWriteOptions,
    ) -> Result<Box<dyn FileSink>> {
        let dir = staging.join(dir);
        fs::create_dir_all(&dir).with_context(|| format!("creating {}", dir.display()))?;
        let name = format!("part-{:05}-{}.{}", index, job_id, self.format.extension());
        self.format.create_sink(&dir.join(name), schema, options)
    }

    /// Write `dataset`, letting `on_commit` add files next to the committed
    /// layout
    ///
    /// Replacing writes call `on_commit` on the staging directory, so its
    /// files are committed by the same rename as the data. Appends call it
    /// on the target once the data files and layout are in place. An error
    /// from `on_commit` fails the write.
    pub fn write_with<C>(
        &self,
        dataset: &Dataset,
        request: WriteRequest,
        cancel: &CancellationToken,
        mut on_commit: C,
    ) -> Result<()>
    where
        C: FnMut(&Path, &DatasetLayout) -> Result<()>,
    {
        let target = match request.target {
            WriteTarget::Path(path) => path,
            other => {
                return Err(TabularError::invalid_argument(format!(
                    "{} connector writes to a path, got {}",
                    self.format.name(),
                    other
                )))
            }
        };
        cancel.check()?;

        let exists = target.exists();
        match (request.mode, exists) {
            (SaveMode::ErrorIfExists, true) => {
                return Err(TabularError::TableAlreadyExists(target.display().to_string()))
            }
            (SaveMode::Ignore, true) => {
                info!(target = %target.display(), "target exists, ignoring write");
                return Ok(());
            }
            _ => {}
        }
        let append = request.mode == SaveMode::Append && exists;
        if append && !target.is_dir() {
            return Err(TabularError::invalid_argument(format!(
                "cannot append to {}: not a dataset directory",
                target.display()
            )));
        }

        let options = FileWriteOptions::from_options(&request.options)?;
        let schema = dataset.schema();
        let spec = PartitionSpec::new(schema, &request.partition_columns)?;

        let layout = if append {
            merged_layout(&target, self.format.name(), schema, &request.partition_columns)?
        } else {
            DatasetLayout {
                format: self.format.name().to_string(),
                schema: schema.as_ref().clone(),
                partition_columns: request.partition_columns.clone(),
            }
        };

        let job_id = Uuid::new_v4();
        let staging = sibling_path(&target, "staging", job_id)?;
        fs::create_dir_all(&staging).with_context(|| format!("creating {}", staging.display()))?;

        let outcome = self
            .write_files(dataset, &spec, &staging, &options, job_id, cancel)
            .and_then(|counts| {
                cancel.check()?;
                if append {
                    commit_append(&staging, &target, &layout)?;
                    on_commit(&target, &layout)?;
                } else {
                    layout.store(&staging)?;
                    on_commit(&staging, &layout)?;
                    touch_success(&staging)?;
                    commit_replace(&staging, &target, job_id)?;
                }
                Ok(counts)
            });

        match outcome {
            Ok((files, rows)) => {
                info!(
                    target = %target.display(),
                    format = self.format.name(),
                    mode = %request.mode,
                    files,
                    rows,
                    "committed write"
                );
                Ok(())
            }
            Err(e) => {
                if staging.exists() {
                    if let Err(cleanup) = fs::remove_dir_all(&staging) {
                        warn!(staging = %staging.display(), error = %cleanup, "failed to remove staging directory");
                    }
                }
                Err(e)
            }
        }
    }
}

impl<F: FileFormat> Connector for FileConnector<F> {
    fn name(&self) -> &str {
        self.format.name()
    }

    fn read(&self, request: ReadRequest, cancel: &CancellationToken) -> Result<Dataset> {
        let root = match request.source {
            ReadSource::Path(path) => path,
            other => {
                return Err(TabularError::invalid_argument(format!(
                    "{} connector reads from a path, got {}",
                    self.format.name(),
                    other
                )))
            }
        };
        cancel.check()?;

        let options = FileReadOptions::from_options(&request.options)?;
        let (plan, schema) = self.plan_scan(&root, request.schema, options)?;
        let plan = Arc::new(plan);
        let cancel = cancel.clone();

        Ok(Dataset::from_replayable(Arc::new(schema), move || {
            let rows: RowStream = Box::new(FileRows {
                plan: plan.clone(),
                cancel: cancel.clone(),
                next_file: 0,
                current_file: 0,
                current: None,
                done: false,
            });
            Ok(rows)
        }))
    }

    fn write(&self, dataset: &Dataset, request: WriteRequest, cancel: &CancellationToken) -> Result<()> {
        self.write_with(dataset, request, cancel, |_, _| Ok(()))
    }
}

fn apply_binary_as_string(schema: Schema, options: &FileReadOptions) -> Schema {
    if options.binary_as_string {
        schema.binary_as_string()
    } else {
        schema
    }
}

/// Layout of an existing dataset extended by an appended write
fn merged_layout(target: &Path, format: &str, schema: &Schema, partition_columns: &[String]) -> Result<DatasetLayout> {
    let Some(existing) = DatasetLayout::load(target)? else {
        return Ok(DatasetLayout {
            format: format.to_string(),
            schema: schema.clone(),
            partition_columns: partition_columns.to_vec(),
        });
    };

    if existing.partition_columns != partition_columns {
        return Err(TabularError::invalid_option(
            "partitionBy",
            format!(
                "appending with partition columns [{}] to a dataset partitioned by [{}]",
                partition_columns.join(", "),
                existing.partition_columns.join(", ")
            ),
        ));
    }
    if existing.format != format {
        return Err(TabularError::invalid_argument(format!(
            "cannot append {} files to a {} dataset at {}",
            format,
            existing.format,
            target.display()
        )));
    }

    Ok(DatasetLayout {
        schema: existing.schema.merge(schema)?,
        ..existing
    })
}

/// Hidden sibling of `target` used during a write
fn sibling_path(target: &Path, kind: &str, job_id: Uuid) -> Result<PathBuf> {
    let name = target
        .file_name()
        .ok_or_else(|| TabularError::invalid_argument(format!("invalid write target {}", target.display())))?;
    let sibling = format!(".{}.{}-{}", name.to_string_lossy(), kind, job_id);
    Ok(match target.parent() {
        Some(parent) => parent.join(sibling),
        None => PathBuf::from(sibling),
    })
}

fn touch_success(dir: &Path) -> Result<()> {
    let path = dir.join(SUCCESS_MARKER);
    fs::write(&path, b"").with_context(|| format!("writing {}", path.display()))
}

/// Swap the staged directory in for `target`, keeping the old data until
/// the rename succeeded
fn commit_replace(staging: &Path, target: &Path, job_id: Uuid) -> Result<()> {
    if !target.exists() {
        return fs::rename(staging, target).with_context(|| format!("committing {}", target.display()));
    }

    let trash = sibling_path(target, "trash", job_id)?;
    fs::rename(target, &trash).with_context(|| format!("moving aside {}", target.display()))?;
    if let Err(e) = fs::rename(staging, target) {
        if let Err(restore) = fs::rename(&trash, target) {
            warn!(target = %target.display(), error = %restore, "failed to restore previous data");
        }
        return Err(e).with_context(|| format!("committing {}", target.display()));
    }

    let removed = if trash.is_dir() {
        fs::remove_dir_all(&trash)
    } else {
        fs::remove_file(&trash)
    };
    if let Err(e) = removed {
        warn!(path = %trash.display(), error = %e, "failed to remove replaced data");
    }
    Ok(())
}

/// Move staged data files into an existing dataset directory
fn commit_append(staging: &Path, target: &Path, layout: &DatasetLayout) -> Result<()> {
    move_tree(staging, target)?;
    layout.store(target)?;
    touch_success(target)?;
    fs::remove_dir_all(staging).with_context(|| format!("removing {}", staging.display()))
}

fn move_tree(from: &Path, to: &Path) -> Result<()> {
    fs::create_dir_all(to).with_context(|| format!("creating {}", to.display()))?;
    for entry in fs::read_dir(from).with_context(|| format!("listing {}", from.display()))? {
        let entry = entry.with_context(|| format!("listing {}", from.display()))?;
        let source = entry.path();
        let dest = to.join(entry.file_name());
        if source.is_dir() {
            move_tree(&source, &dest)?;
        } else {
            fs::rename(&source, &dest).with_context(|| format!("moving {}", source.display()))?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connector::json::JsonFormat;
    use crate::connector::parquet::ParquetFormat;
    use crate::test_utils::test::{assert_same_rows, raw_panda_rows, raw_panda_schema, raw_pandas};
    use crate::{DataType, Options, SchemaBuilder};

    fn request(target: &Path, mode: SaveMode, partitions: &[&str]) -> WriteRequest {
        WriteRequest {
            target: WriteTarget::Path(target.to_path_buf()),
            format: "parquet".to_string(),
            mode,
            partition_columns: partitions.iter().map(|c| c.to_string()).collect(),
            options: Options::new(),
        }
    }

    fn read(connector: &FileConnector<impl FileFormat>, path: &Path, options: Options) -> Result<Dataset> {
        let request = ReadRequest::new(ReadSource::Path(path.to_path_buf()), connector.name()).with_options(options);
        connector.read(request, &CancellationToken::new())
    }

    fn part_files(dir: &Path) -> Vec<PathBuf> {
        discover_files(dir).unwrap().into_iter().map(|f| f.path).collect()
    }

    fn entry_names(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = fs::read_dir(dir)
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    #[test]
    fn test_hidden_entries() {
        assert!(is_hidden(SUCCESS_MARKER, false));
        assert!(is_hidden(LAYOUT_FILE, false));
        assert!(is_hidden("_temporary", true));
        assert!(is_hidden(".output.staging-1", true));
        assert!(is_hidden(".zip=94110", true));
        assert!(is_hidden("_zip=94110", false));
        assert!(!is_hidden("_zip=94110", true));
        assert!(!is_hidden("zip=94110", true));
        assert!(!is_hidden("part-00000.parquet", false));
    }

    #[test]
    fn test_write_atomic_replaces_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(LAYOUT_FILE);
        write_atomic(&path, b"first").unwrap();
        write_atomic(&path, b"second").unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "second");
        assert_eq!(entry_names(dir.path()), vec![LAYOUT_FILE]);
    }

    #[test]
    fn test_commit_hook_files_land_with_data() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("output");
        let connector = FileConnector::new(ParquetFormat);
        let cancel = CancellationToken::new();

        connector
            .write_with(&raw_pandas(3), request(&out, SaveMode::ErrorIfExists, &[]), &cancel, |dir, layout| {
                assert_eq!(layout.schema, raw_panda_schema());
                fs::write(dir.join("_extra"), b"").unwrap();
                Ok(())
            })
            .unwrap();
        assert!(out.join("_extra").is_file());

        let err = connector
            .write_with(&raw_pandas(5), request(&out, SaveMode::Overwrite, &[]), &cancel, |_, _| {
                Err(TabularError::invalid_argument("rejected"))
            })
            .unwrap_err();
        assert!(matches!(err, TabularError::InvalidArgument(_)));
        assert_eq!(read(&connector, &out, Options::new()).unwrap().count().unwrap(), 3);
        assert_eq!(entry_names(dir.path()), vec!["output"]);
    }

    #[test]
    fn test_partitioned_write_restores_schema_and_rows() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("output");
        let connector = FileConnector::new(ParquetFormat);

        connector
            .write(&raw_pandas(9), request(&out, SaveMode::ErrorIfExists, &["zipcode"]), &CancellationToken::new())
            .unwrap();

        assert!(out.join(SUCCESS_MARKER).is_file());
        assert!(out.join(LAYOUT_FILE).is_file());
        for zip in ["94110", "10003", "60614"] {
            assert!(out.join(format!("zipcode={}", zip)).is_dir());
        }

        let ds = read(&connector, &out, Options::new()).unwrap();
        assert_eq!(**ds.schema(), raw_panda_schema());
        assert_same_rows(&raw_panda_rows(9), &ds.collect().unwrap());
    }

    #[test]
    fn test_partition_types_inferred_without_layout() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("output");
        let connector = FileConnector::new(ParquetFormat);
        connector
            .write(&raw_pandas(6), request(&out, SaveMode::Overwrite, &["zipcode"]), &CancellationToken::new())
            .unwrap();
        fs::remove_file(out.join(LAYOUT_FILE)).unwrap();

        let ds = read(&connector, &out, Options::new()).unwrap();
        assert_eq!(ds.schema().field_names(), vec!["id", "happy", "attributes", "zipcode"]);
        assert_eq!(ds.schema().field_with_name("zipcode").unwrap().data_type(), &DataType::Integer);
        assert_eq!(ds.count().unwrap(), 6);
    }

    #[test]
    fn test_error_if_exists_and_ignore_leave_data_alone() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("output");
        let connector = FileConnector::new(ParquetFormat);
        let cancel = CancellationToken::new();

        connector.write(&raw_pandas(3), request(&out, SaveMode::ErrorIfExists, &[]), &cancel).unwrap();
        let err = connector
            .write(&raw_pandas(5), request(&out, SaveMode::ErrorIfExists, &[]), &cancel)
            .unwrap_err();
        assert!(matches!(err, TabularError::TableAlreadyExists(_)));
        connector.write(&raw_pandas(5), request(&out, SaveMode::Ignore, &[]), &cancel).unwrap();

        assert_eq!(read(&connector, &out, Options::new()).unwrap().count().unwrap(), 3);
    }

    #[test]
    fn test_append_adds_files_and_overwrite_replaces() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("output");
        let connector = FileConnector::new(ParquetFormat);
        let cancel = CancellationToken::new();

        connector.write(&raw_pandas(3), request(&out, SaveMode::Append, &["zipcode"]), &cancel).unwrap();
        connector.write(&raw_pandas(3), request(&out, SaveMode::Append, &["zipcode"]), &cancel).unwrap();
        assert_eq!(part_files(&out).len(), 6);
        let mut expected = raw_panda_rows(3);
        expected.extend(raw_panda_rows(3));
        assert_same_rows(&expected, &read(&connector, &out, Options::new()).unwrap().collect().unwrap());

        let err = connector
            .write(&raw_pandas(1), request(&out, SaveMode::Append, &[]), &cancel)
            .unwrap_err();
        assert!(matches!(err, TabularError::InvalidOption { .. }));

        connector.write(&raw_pandas(2), request(&out, SaveMode::Overwrite, &[]), &cancel).unwrap();
        assert_eq!(part_files(&out).len(), 1);
        assert_eq!(read(&connector, &out, Options::new()).unwrap().count().unwrap(), 2);
    }

    #[test]
    fn test_max_records_per_file_rolls_files() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("output");
        let connector = FileConnector::new(JsonFormat);
        let mut req = request(&out, SaveMode::Overwrite, &[]);
        req.options.set("maxRecordsPerFile", "2");

        connector.write(&raw_pandas(5), req, &CancellationToken::new()).unwrap();
        assert_eq!(part_files(&out).len(), 3);
        assert_same_rows(&raw_panda_rows(5), &read(&connector, &out, Options::new()).unwrap().collect().unwrap());
    }

    #[test]
    fn test_cancelled_write_leaves_no_trace() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("output");
        let connector = FileConnector::new(ParquetFormat);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = connector
            .write(&raw_pandas(3), request(&out, SaveMode::Overwrite, &[]), &cancel)
            .unwrap_err();
        assert!(matches!(err, TabularError::Cancelled));
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_empty_write_keeps_schema() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("output");
        let connector = FileConnector::new(ParquetFormat);
        connector
            .write(&raw_pandas(0), request(&out, SaveMode::Overwrite, &[]), &CancellationToken::new())
            .unwrap();

        fs::remove_file(out.join(LAYOUT_FILE)).unwrap();
        let ds = read(&connector, &out, Options::new()).unwrap();
        assert_eq!(ds.schema().len(), 4);
        assert_eq!(ds.count().unwrap(), 0);
    }

    #[test]
    fn test_merge_schema_across_files() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("merged");
        fs::create_dir(&out).unwrap();

        let ab = Arc::new(
            SchemaBuilder::new()
                .field("a", DataType::Long, false)
                .field("b", DataType::String, true)
                .build()
                .unwrap(),
        );
        let ac = Arc::new(
            SchemaBuilder::new()
                .field("a", DataType::Long, false)
                .field("c", DataType::Double, true)
                .build()
                .unwrap(),
        );
        let mut sink = ParquetFormat
            .create_sink(&out.join("part-00000.parquet"), ab, &FileWriteOptions::default())
            .unwrap();
        sink.write_row(Row::new(vec![Value::Long(1), Value::from("x")])).unwrap();
        sink.finish().unwrap();
        let mut sink = ParquetFormat
            .create_sink(&out.join("part-00001.parquet"), ac, &FileWriteOptions::default())
            .unwrap();
        sink.write_row(Row::new(vec![Value::Long(2), Value::from(2.5)])).unwrap();
        sink.finish().unwrap();

        let connector = FileConnector::new(ParquetFormat);
        let plain = read(&connector, &out, Options::new()).unwrap();
        assert_eq!(plain.schema().field_names(), vec!["a", "b"]);

        let merged = read(&connector, &out, Options::new().with("mergeSchema", "true")).unwrap();
        assert_eq!(merged.schema().field_names(), vec!["a", "b", "c"]);
        let rows = merged.collect().unwrap();
        assert_eq!(rows[0], Row::new(vec![Value::Long(1), Value::from("x"), Value::Null]));
        assert_eq!(rows[1], Row::new(vec![Value::Long(2), Value::Null, Value::from(2.5)]));
    }

    #[test]
    fn test_empty_location_requires_schema() {
        let dir = tempfile::tempdir().unwrap();
        let connector = FileConnector::new(ParquetFormat);
        let err = read(&connector, dir.path(), Options::new()).unwrap_err();
        assert!(matches!(err, TabularError::Schema(msg) if msg.contains("Unable to infer schema")));

        let schema = SchemaBuilder::new().field("id", DataType::Long, true).build().unwrap();
        let request = ReadRequest::new(ReadSource::Path(dir.path().to_path_buf()), "parquet").with_schema(schema);
        let ds = connector.read(request, &CancellationToken::new()).unwrap();
        assert_eq!(ds.count().unwrap(), 0);
    }
}
