//! Fault reports and the shared fault path

use std::path::{Path, PathBuf};

use serde::Serialize;

use rendergate_engine::module::locate;
use rendergate_engine::process::{current_thread_id, expand_env, process_directory, process_name};
use rendergate_engine::HostModule;

use super::hazard::HazardCell;
use super::writer::default_writer;
use super::CrashSnapshot;
use crate::config::DumpType;

/// Raised by the abnormal-termination (panic) handler
pub const CODE_TERMINATE: u32 = 0xE000_0001;
/// Raised by the invalid-parameter handler
pub const CODE_INVALID_PARAMETER: u32 = 0xE000_0002;
/// Raised by the pure-virtual-call handler
pub const CODE_PURECALL: u32 = 0xE000_0003;

/// Symbolic name of an exception code
pub fn exception_name(code: u32) -> &'static str {
    match code {
        0xC000_0005 => "EXCEPTION_ACCESS_VIOLATION",
        0xC000_008C => "EXCEPTION_ARRAY_BOUNDS_EXCEEDED",
        0x8000_0003 => "EXCEPTION_BREAKPOINT",
        0x8000_0002 => "EXCEPTION_DATATYPE_MISALIGNMENT",
        0xC000_008D => "EXCEPTION_FLT_DENORMAL_OPERAND",
        0xC000_008E => "EXCEPTION_FLT_DIVIDE_BY_ZERO",
        0xC000_008F => "EXCEPTION_FLT_INEXACT_RESULT",
        0xC000_0090 => "EXCEPTION_FLT_INVALID_OPERATION",
        0xC000_0091 => "EXCEPTION_FLT_OVERFLOW",
        0xC000_0092 => "EXCEPTION_FLT_STACK_CHECK",
        0xC000_0093 => "EXCEPTION_FLT_UNDERFLOW",
        0x8000_0001 => "EXCEPTION_GUARD_PAGE",
        0xC000_001D => "EXCEPTION_ILLEGAL_INSTRUCTION",
        0xC000_0006 => "EXCEPTION_IN_PAGE_ERROR",
        0xC000_0094 => "EXCEPTION_INT_DIVIDE_BY_ZERO",
        0xC000_0095 => "EXCEPTION_INT_OVERFLOW",
        0xC000_0026 => "EXCEPTION_INVALID_DISPOSITION",
        0xC000_0008 => "EXCEPTION_INVALID_HANDLE",
        0xC000_0025 => "EXCEPTION_NONCONTINUABLE_EXCEPTION",
        0xC000_0096 => "EXCEPTION_PRIV_INSTRUCTION",
        0x8000_0004 => "EXCEPTION_SINGLE_STEP",
        0xC000_00FD => "EXCEPTION_STACK_OVERFLOW",
        0xC000_0374 => "STATUS_HEAP_CORRUPTION",
        CODE_TERMINATE => "ABNORMAL_TERMINATION",
        CODE_INVALID_PARAMETER => "INVALID_PARAMETER",
        CODE_PURECALL => "PURE_VIRTUAL_CALL",
        _ => "UNKNOWN_EXCEPTION",
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Register {
    pub name: &'static str,
    pub value: u64,
}

/// What a platform handler knows about a fault
#[derive(Debug, Clone, Default)]
pub struct FaultContext {
    /// Handler that caught the fault
    pub trigger: &'static str,
    pub code: u32,
    /// Instruction address, zero if unknown
    pub address: usize,
    pub registers: Vec<Register>,
    /// Panic message or similar free-form detail
    pub detail: Option<String>,
    /// Platform exception record (`EXCEPTION_POINTERS` on Windows)
    pub exception_pointers: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FaultModule {
    pub path: String,
    pub offset: usize,
}

/// Structured description of one fault
#[derive(Debug, Clone, Serialize)]
pub struct FaultReport {
    pub trigger: &'static str,
    pub code: u32,
    pub name: &'static str,
    pub address: usize,
    pub module: Option<FaultModule>,
    pub thread_id: u64,
    pub process: String,
    pub pid: u32,
    pub timestamp: String,
    pub registers: Vec<Register>,
    pub detail: Option<String>,
    /// Engine handle of the snapshot owner, zero without a snapshot
    #[serde(skip)]
    pub engine: usize,
    #[serde(skip)]
    pub exception_pointers: usize,
}

impl FaultReport {
    pub fn new(context: FaultContext, engine: usize, now: chrono::DateTime<chrono::Local>) -> Self {
        let module = locate(context.address).map(|l| FaultModule {
            path: l.path.display().to_string(),
            offset: l.offset,
        });
        Self {
            trigger: context.trigger,
            code: context.code,
            name: exception_name(context.code),
            address: context.address,
            module,
            thread_id: current_thread_id(),
            process: process_name(),
            pid: std::process::id(),
            timestamp: now.format("%Y%m%d-%H%M%S").to_string(),
            registers: context.registers,
            detail: context.detail,
            engine,
            exception_pointers: context.exception_pointers,
        }
    }

    /// `RenderGate-{process}-{pid}-{timestamp}-0x{code}.{ext}`
    pub fn file_name(&self, extension: &str) -> String {
        format!(
            "RenderGate-{}-{}-{}-0x{:08X}.{}",
            self.process, self.pid, self.timestamp, self.code, extension
        )
    }

    fn log(&self) {
        tracing::error!("=== RenderGate crash handler ({}) ===", self.trigger);
        tracing::error!("Exception code: 0x{:08X} ({})", self.code, self.name);
        tracing::error!("Faulting address: {:#x}", self.address);
        tracing::error!("Thread ID: {}", self.thread_id);
        if let Some(module) = &self.module {
            tracing::error!("Faulting module: {} + 0x{:X}", module.path, module.offset);
        }
        if let Some(detail) = &self.detail {
            tracing::error!("Detail: {}", detail);
        }
        for chunk in self.registers.chunks(3) {
            let line: Vec<String> = chunk
                .iter()
                .map(|r| format!("{}=0x{:016X}", r.name, r.value))
                .collect();
            tracing::error!("Registers: {}", line.join(" "));
        }
    }
}

/// Dump directory: configured, process directory, host module directory, temp
pub fn dump_directory(configured: Option<&str>, host: Option<HostModule>) -> PathBuf {
    if let Some(dir) = configured {
        let expanded = expand_env(dir);
        if !expanded.is_empty() {
            return PathBuf::from(expanded);
        }
    }
    process_directory()
        .or_else(|| host.and_then(HostModule::directory))
        .unwrap_or_else(std::env::temp_dir)
}

/// Report a fault against whatever snapshot is published
///
/// Never blocks on the installer's lock. Returns the file written, if any.
pub fn handle_fault(cell: &HazardCell<CrashSnapshot>, context: FaultContext) -> Option<PathBuf> {
    let now = chrono::Local::now();
    match cell.read(|snapshot| process(Some(snapshot), context.clone(), now)) {
        Some(written) => written,
        None => process(None, context, now),
    }
}

fn process(
    snapshot: Option<&CrashSnapshot>,
    context: FaultContext,
    now: chrono::DateTime<chrono::Local>,
) -> Option<PathBuf> {
    let report = FaultReport::new(context, snapshot.map_or(0, |s| s.engine), now);
    report.log();

    if let Some(on_fault) = snapshot.and_then(|s| s.on_fault.as_ref()) {
        if !on_fault(&report) {
            tracing::error!("Fault callback returned false, skipping dump file");
            return None;
        }
    }

    let writer = snapshot.map_or_else(default_writer, |s| s.writer.clone());
    let dump_type = snapshot.map_or(DumpType::Normal, |s| s.dump_type);
    let directory = dump_directory(
        snapshot.and_then(|s| s.dump_directory.as_deref()),
        snapshot.and_then(|s| s.host),
    );
    let path = directory.join(report.file_name(writer.extension()));

    match writer.write(&path, &report, dump_type) {
        Ok(()) => {
            tracing::error!("Crash snapshot written to: {}", path.display());
            Some(path)
        }
        Err(e) => {
            tracing::error!("Failed to write crash snapshot {}: {}", path.display(), e);
            None
        }
    }
}

/// True if `path` looks like a snapshot this module wrote
pub fn is_snapshot_file(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.starts_with("RenderGate-"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn context(code: u32) -> FaultContext {
        FaultContext {
            trigger: "test",
            code,
            address: context as fn(u32) -> FaultContext as usize,
            registers: vec![Register {
                name: "RIP",
                value: 0x1234,
            }],
            ..Default::default()
        }
    }

    #[test]
    fn test_exception_names() {
        assert_eq!(exception_name(0xC000_0005), "EXCEPTION_ACCESS_VIOLATION");
        assert_eq!(exception_name(0xC000_0374), "STATUS_HEAP_CORRUPTION");
        assert_eq!(exception_name(CODE_PURECALL), "PURE_VIRTUAL_CALL");
        assert_eq!(exception_name(0x1234), "UNKNOWN_EXCEPTION");
    }

    #[test]
    fn test_file_name_format() {
        let now = chrono::Local.with_ymd_and_hms(2024, 3, 9, 7, 5, 1).unwrap();
        let report = FaultReport::new(context(0xC000_0005), 0, now);
        let name = report.file_name("dmp");
        assert_eq!(
            name,
            format!(
                "RenderGate-{}-{}-20240309-070501-0xC0000005.dmp",
                process_name(),
                std::process::id()
            )
        );
        assert!(is_snapshot_file(Path::new(&name)));
    }

    #[test]
    fn test_report_resolves_module() {
        let report = FaultReport::new(context(1), 0, chrono::Local::now());
        let module = report.module.expect("test binary resolves");
        assert!(!module.path.is_empty());
    }

    #[test]
    fn test_dump_directory_prefers_configured() {
        std::env::set_var("RG_TEST_DUMP_DIR", "/var/dumps");
        assert_eq!(
            dump_directory(Some("$RG_TEST_DUMP_DIR/rg"), None),
            PathBuf::from("/var/dumps/rg")
        );
        assert_eq!(
            dump_directory(Some(""), None),
            process_directory().unwrap_or_else(std::env::temp_dir)
        );
    }
}
