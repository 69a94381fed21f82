use std::{
    collections::HashMap,
    fmt::Write as _,
    path::{Path, PathBuf},
};

use async_trait::async_trait;
use tokio::{
    fs::{File, OpenOptions},
    io::{AsyncBufReadExt, AsyncWriteExt, BufReader},
    sync::Mutex,
};
use tokio_util::sync::CancellationToken;

use crate::{
    sink::{Sink, SinkError},
    types::EventRecord,
};

/// Writes records to one CSV file per `(contract name, event name)` pair.
///
/// Files are opened on first use as `<contract>_<event>.csv` in the output directory. A new file
/// gets a header made of the sorted keys of its first record; a file left by an earlier run keeps
/// its header. Rows follow the header order and keys a record lacks are written empty. Keys not
/// in the header are not written.
#[derive(Debug)]
pub struct CsvSink {
    dir: PathBuf,
    files: Mutex<HashMap<String, CsvFile>>,
}

#[derive(Debug)]
struct CsvFile {
    path: PathBuf,
    file: File,
    header: Vec<String>,
}

impl CsvSink {
    /// Creates the output directory if needed.
    ///
    /// # Errors
    ///
    /// Returns [`SinkError::Io`] if the directory cannot be created.
    pub async fn new(dir: impl Into<PathBuf>) -> Result<Self, SinkError> {
        let dir = dir.into();
        tokio::fs::create_dir_all(&dir).await.map_err(|err| SinkError::io(&dir, err))?;
        Ok(Self { dir, files: Mutex::new(HashMap::new()) })
    }

    #[must_use]
    pub fn output_dir(&self) -> &Path {
        &self.dir
    }

    /// File name used for a contract/event pair.
    ///
    /// Bytes outside `[A-Za-z0-9-]` are written as `%XX`, so `_` only ever separates the two
    /// parts and distinct pairs never share a file.
    #[must_use]
    pub fn file_name(contract: &str, event: &str) -> String {
        format!("{}_{}.csv", escape_name(contract), escape_name(event))
    }

    async fn open(&self, name: &str, record: &EventRecord) -> Result<CsvFile, SinkError> {
        let path = self.dir.join(name);
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(|err| SinkError::io(&path, err))?;

        if let Some(header) = read_header(&path).await? {
            debug!(file = %path.display(), columns = header.len(), "reusing existing csv header");
            return Ok(CsvFile { path, file, header });
        }

        let header: Vec<String> = record.keys().map(ToOwned::to_owned).collect();
        file.write_all(encode_row(&header).as_bytes())
            .await
            .map_err(|err| SinkError::io(&path, err))?;
        debug!(file = %path.display(), columns = header.len(), "created csv file");
        Ok(CsvFile { path, file, header })
    }
}

#[async_trait]
impl Sink for CsvSink {
    async fn write(&self, record: &EventRecord, _token: &CancellationToken) -> Result<(), SinkError> {
        let name = Self::file_name(record.contract_name(), record.event_name());
        let mut files = self.files.lock().await;

        if !files.contains_key(&name) {
            let opened = self.open(&name, record).await?;
            files.insert(name.clone(), opened);
        }
        let Some(csv) = files.get_mut(&name) else {
            return Err(SinkError::Rejected(format!("no open file for {name}")));
        };

        let row: Vec<String> = csv
            .header
            .iter()
            .map(|key| record.get(key).map(ToString::to_string).unwrap_or_default())
            .collect();
        csv.file.write_all(encode_row(&row).as_bytes()).await.map_err(|err| SinkError::io(&csv.path, err))?;
        csv.file.flush().await.map_err(|err| SinkError::io(&csv.path, err))
    }
}

fn escape_name(part: &str) -> String {
    let mut escaped = String::with_capacity(part.len());
    for byte in part.bytes() {
        if byte.is_ascii_alphanumeric() || byte == b'-' {
            escaped.push(char::from(byte));
        } else {
            let _ = write!(escaped, "%{byte:02X}");
        }
    }
    escaped
}

/// Header of an existing non-empty file, `None` for a missing or empty file.
///
/// A quoted header name may span lines; reading continues until the quotes balance.
async fn read_header(path: &Path) -> Result<Option<Vec<String>>, SinkError> {
    let file = File::open(path).await.map_err(|err| SinkError::io(path, err))?;
    let mut reader = BufReader::new(file);
    let mut header = String::new();
    loop {
        let read =
            reader.read_line(&mut header).await.map_err(|err| SinkError::io(path, err))?;
        if read == 0 || header.matches('"').count() % 2 == 0 {
            break;
        }
    }

    if header.trim_end_matches(['\r', '\n']).is_empty() {
        return Ok(None);
    }
    Ok(decode_rows(&header).into_iter().next())
}

fn encode_field(field: &str) -> String {
    if field.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_owned()
    }
}

fn encode_row<S: AsRef<str>>(fields: &[S]) -> String {
    let mut line =
        fields.iter().map(|field| encode_field(field.as_ref())).collect::<Vec<_>>().join(",");
    line.push('\n');
    line
}

/// Splits CSV text into rows of fields. Quoted fields may hold commas, quotes and line breaks.
/// Blank lines are skipped.
pub(crate) fn decode_rows(text: &str) -> Vec<Vec<String>> {
    let mut rows = Vec::new();
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut quoted = false;
    let mut touched = false;
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        match (c, quoted) {
            ('"', true) if chars.peek() == Some(&'"') => {
                current.push('"');
                chars.next();
            }
            ('"', _) => {
                quoted = !quoted;
                touched = true;
            }
            (',', false) => {
                fields.push(std::mem::take(&mut current));
                touched = true;
            }
            ('\r', false) if chars.peek() == Some(&'\n') => {}
            ('\n', false) => {
                if touched || !current.is_empty() {
                    fields.push(std::mem::take(&mut current));
                    rows.push(std::mem::take(&mut fields));
                }
                touched = false;
            }
            (c, _) => current.push(c),
        }
    }
    if touched || !current.is_empty() {
        fields.push(current);
        rows.push(fields);
    }
    rows
}
