//! Snapshot writers
//!
//! The fault path hands a finished [`FaultReport`] to a [`SnapshotWriter`].
//! Windows gets a minidump of the live process; other platforms get the
//! report itself as JSON.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;
use std::sync::Arc;

use super::report::FaultReport;
use crate::config::DumpType;

pub trait SnapshotWriter: Send + Sync {
    /// File extension of the snapshots this writer produces
    fn extension(&self) -> &'static str;

    fn write(&self, path: &Path, report: &FaultReport, dump_type: DumpType) -> io::Result<()>;
}

/// Writes the report as pretty-printed JSON
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonReportWriter;

impl SnapshotWriter for JsonReportWriter {
    fn extension(&self) -> &'static str {
        "json"
    }

    fn write(&self, path: &Path, report: &FaultReport, _dump_type: DumpType) -> io::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut out = BufWriter::new(File::create(path)?);
        serde_json::to_writer_pretty(&mut out, report)?;
        out.flush()
    }
}

/// Platform default writer
pub fn default_writer() -> Arc<dyn SnapshotWriter> {
    #[cfg(windows)]
    {
        Arc::new(minidump::MiniDumpWriter)
    }
    #[cfg(not(windows))]
    {
        Arc::new(JsonReportWriter)
    }
}

#[cfg(windows)]
pub use minidump::MiniDumpWriter;

#[cfg(windows)]
mod minidump {
    use std::fs::File;
    use std::io;
    use std::os::windows::io::AsRawHandle;
    use std::path::Path;

    use windows::Win32::Foundation::HANDLE;
    use windows::Win32::System::Diagnostics::Debug::{
        MiniDumpNormal, MiniDumpWithDataSegs, MiniDumpWithFullMemory, MiniDumpWithHandleData,
        MiniDumpWithThreadInfo, MiniDumpWithUnloadedModules, MiniDumpWriteDump,
        EXCEPTION_POINTERS, MINIDUMP_EXCEPTION_INFORMATION, MINIDUMP_TYPE,
    };
    use windows::Win32::System::Threading::{GetCurrentProcess, GetCurrentProcessId};

    use super::SnapshotWriter;
    use crate::config::DumpType;
    use crate::crash::report::FaultReport;

    /// Writes a `MiniDumpWriteDump` snapshot of the current process
    #[derive(Debug, Default, Clone, Copy)]
    pub struct MiniDumpWriter;

    fn dump_flags(dump_type: DumpType) -> MINIDUMP_TYPE {
        match dump_type {
            DumpType::Minimal => MiniDumpNormal,
            DumpType::Normal => MINIDUMP_TYPE(
                MiniDumpNormal.0
                    | MiniDumpWithDataSegs.0
                    | MiniDumpWithHandleData.0
                    | MiniDumpWithThreadInfo.0
                    | MiniDumpWithUnloadedModules.0,
            ),
            DumpType::Full => MINIDUMP_TYPE(
                MiniDumpWithFullMemory.0
                    | MiniDumpWithHandleData.0
                    | MiniDumpWithThreadInfo.0
                    | MiniDumpWithUnloadedModules.0,
            ),
        }
    }

    impl SnapshotWriter for MiniDumpWriter {
        fn extension(&self) -> &'static str {
            "dmp"
        }

        fn write(&self, path: &Path, report: &FaultReport, dump_type: DumpType) -> io::Result<()> {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let file = File::create(path)?;

            let exception = MINIDUMP_EXCEPTION_INFORMATION {
                ThreadId: report.thread_id as u32,
                ExceptionPointers: report.exception_pointers as *mut EXCEPTION_POINTERS,
                ClientPointers: false.into(),
            };
            let exception_param = (report.exception_pointers != 0)
                .then_some(&exception as *const MINIDUMP_EXCEPTION_INFORMATION);

            unsafe {
                MiniDumpWriteDump(
                    GetCurrentProcess(),
                    GetCurrentProcessId(),
                    HANDLE(file.as_raw_handle() as _),
                    dump_flags(dump_type),
                    exception_param,
                    None,
                    None,
                )
            }
            .map_err(|e| io::Error::other(e.to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crash::report::{FaultContext, CODE_TERMINATE};

    #[test]
    fn test_json_writer_output() {
        let dir = tempfile::tempdir().unwrap();
        let report = FaultReport::new(
            FaultContext {
                trigger: "test",
                code: CODE_TERMINATE,
                detail: Some("boom".into()),
                exception_pointers: 0xdead,
                ..Default::default()
            },
            0xbeef,
            chrono::Local::now(),
        );
        let path = dir.path().join("sub").join(report.file_name("json"));
        JsonReportWriter.write(&path, &report, DumpType::Full).unwrap();

        let value: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(value["code"], CODE_TERMINATE);
        assert_eq!(value["name"], "ABNORMAL_TERMINATION");
        assert_eq!(value["detail"], "boom");
        assert!(value.get("engine").is_none());
        assert!(value.get("exception_pointers").is_none());
    }
}
