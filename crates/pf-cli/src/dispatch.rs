use std::path::Path;

use anyhow::Result;
use pf_core::{
    config::EnvSnapshot,
    device, redact,
    runtime::{find_executable, Runtime},
    scan,
    store::{epoch_now, NewBoot, NewPackage, PackageType},
    ProvenanceStore,
};
use serde::Serialize;
use serde_json::{json, Value};

use crate::cli::{
    CommandCli, ConfidenceArgs, ImageArgs, LocateArgs, PackageKindArg, PfCli, PurgeArgs,
    SanitizeArgs, Sha1Args, StoreCommand, TrackArgs,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandStatus {
    Ok,
    UserError,
    Failure,
}

#[derive(Debug, Clone)]
pub struct Outcome {
    pub status: CommandStatus,
    pub message: String,
    pub details: Value,
}

impl Outcome {
    fn ok(message: impl Into<String>, details: Value) -> Self {
        Self {
            status: CommandStatus::Ok,
            message: message.into(),
            details,
        }
    }

    fn user_error(message: impl Into<String>, details: Value) -> Self {
        Self {
            status: CommandStatus::UserError,
            message: message.into(),
            details,
        }
    }

    fn failure(message: impl Into<String>, details: Value) -> Self {
        Self {
            status: CommandStatus::Failure,
            message: message.into(),
            details,
        }
    }

    pub fn exit_code(&self) -> i32 {
        match self.status {
            CommandStatus::Ok => 0,
            CommandStatus::UserError => 1,
            CommandStatus::Failure => 2,
        }
    }
}

fn bootstrap(cli: &PfCli) -> Result<Runtime> {
    let mut runtime = Runtime::bootstrap(&EnvSnapshot::capture())?;
    runtime.settings.verbose = cli.verbose > 0 || cli.trace;
    Ok(runtime)
}

pub fn execute(cli: &PfCli) -> Result<Outcome> {
    let runtime = bootstrap(cli)?;
    match &cli.command {
        CommandCli::Locate(args) => locate(&runtime, args),
        CommandCli::Sha1(args) => sha1(&runtime, args),
        CommandCli::Fingerprint(args) => fingerprint(&runtime, args),
        CommandCli::Digest(args) => digest(&runtime, args),
        CommandCli::Confidence(args) => Ok(confidence(args)),
        CommandCli::Sanitize(args) => sanitize(&runtime, args),
        CommandCli::Support => support(&runtime),
        CommandCli::Which(args) => Ok(which(&args.name)),
        CommandCli::UiCoords(args) => {
            let centre = runtime.reported(
                "Failed to read UI dump",
                device::ui_coordinates_in_file(&args.dump, &args.label),
            )?;
            Ok(match centre {
                Some((x, y)) => Outcome::ok(format!("{x} {y}"), json!({ "x": x, "y": y })),
                None => Outcome::user_error(
                    format!("no node labelled '{}' with bounds", args.label),
                    json!({ "label": args.label }),
                ),
            })
        }
        CommandCli::Clean => {
            let failed = runtime.reported("Failed to clear tmp directory", runtime.clear_tmp())?;
            let dir = runtime.layout().tmp_dir();
            if failed == 0 {
                Ok(Outcome::ok(
                    format!("emptied {}", dir.display()),
                    json!({ "dir": dir, "failed": 0 }),
                ))
            } else {
                Ok(Outcome::failure(
                    format!("{failed} entries in {} could not be removed", dir.display()),
                    json!({ "dir": dir, "failed": failed }),
                ))
            }
        }
        CommandCli::Store(command) => {
            let mut store = runtime.open_store()?;
            runtime.reported(
                "Provenance store operation failed",
                store_command(&mut store, command),
            )
        }
    }
}

fn locate(runtime: &Runtime, args: &LocateArgs) -> Result<Outcome> {
    let found = runtime.locate_member(&args.archive, &args.member, args.nested)?;
    let details = json!({
        "archive": args.archive,
        "member": args.member,
        "nested": args.nested,
        "path": found,
    });
    Ok(match found {
        Some(path) => Outcome::ok(path, details),
        None => Outcome::user_error(
            format!("{} not found in {}", args.member, args.archive.display()),
            details,
        ),
    })
}

fn sha1(runtime: &Runtime, args: &Sha1Args) -> Result<Outcome> {
    let extracted = runtime.reported(
        "Failed to read SHA1 from boot image",
        scan::extract_sha1(&args.path, args.length),
    )?;
    let Some(extracted) = extracted else {
        return Ok(Outcome::user_error(
            format!("no SHA1 marker in {}", args.path.display()),
            json!({ "path": args.path, "sha1": Value::Null }),
        ));
    };
    let confidence = args
        .expected
        .as_deref()
        .map(|expected| scan::compare_confidence(expected, &extracted));
    let message = match confidence {
        Some(ratio) => format!("{extracted} ({:.0}% match)", ratio * 100.0),
        None => extracted.clone(),
    };
    Ok(Outcome::ok(
        message,
        json!({ "path": args.path, "sha1": extracted, "confidence": confidence }),
    ))
}

fn fingerprint(runtime: &Runtime, args: &ImageArgs) -> Result<Outcome> {
    let extracted = runtime.reported(
        "Failed to read fingerprint from boot image",
        scan::extract_fingerprint(&args.path),
    )?;
    Ok(match extracted {
        Some(fingerprint) => Outcome::ok(
            fingerprint.clone(),
            json!({ "path": args.path, "fingerprint": fingerprint }),
        ),
        None => Outcome::user_error(
            format!("no fingerprint marker in {}", args.path.display()),
            json!({ "path": args.path, "fingerprint": Value::Null }),
        ),
    })
}

fn digest(runtime: &Runtime, args: &ImageArgs) -> Result<Outcome> {
    let (md5, sha1, sha256) = runtime.reported("Failed to hash file", hashes(&args.path))?;
    Ok(Outcome::ok(
        format!("md5 {md5}\nsha1 {sha1}\nsha256 {sha256}"),
        json!({ "path": args.path, "md5": md5, "sha1": sha1, "sha256": sha256 }),
    ))
}

fn hashes(path: &Path) -> Result<(String, String, String)> {
    Ok((
        scan::md5_file(path)?,
        scan::sha1_file(path)?,
        scan::sha256_file(path)?,
    ))
}

fn confidence(args: &ConfidenceArgs) -> Outcome {
    let ratio = scan::compare_confidence(&args.expected, &args.extracted);
    Outcome::ok(
        format!("{:.0}% match", ratio * 100.0),
        json!({ "expected": args.expected, "extracted": args.extracted, "confidence": ratio }),
    )
}

fn sanitize(runtime: &Runtime, args: &SanitizeArgs) -> Result<Outcome> {
    let mut failed = Vec::new();
    for path in &args.files {
        if !redact::sanitize_file(path).applied {
            failed.push(path.clone());
        }
    }
    let store_rows = match &args.store {
        Some(path) => Some(runtime.reported(
            "Failed to sanitize provenance store",
            redact::sanitize_store(path),
        )?),
        None => None,
    };
    let details = json!({
        "files": args.files,
        "failed": failed,
        "store_rows": store_rows,
    });
    if failed.is_empty() {
        let mut message = format!("sanitized {} file(s)", args.files.len());
        if let Some(rows) = store_rows {
            message.push_str(&format!(", {rows} store row(s)"));
        }
        Ok(Outcome::ok(message, details))
    } else {
        Ok(Outcome::failure(
            format!("{} file(s) could not be sanitized", failed.len()),
            details,
        ))
    }
}

fn support(runtime: &Runtime) -> Result<Outcome> {
    let report = runtime.export_support_bundle()?;
    Ok(Outcome::ok(
        format!("support bundle written to {}", report.archive.display()),
        json!({
            "archive": report.archive,
            "included": report.included,
            "skipped": report.skipped,
            "sanitized": report.sanitized,
            "unsanitized": report.unsanitized,
            "store_rows": report.store_rows,
        }),
    ))
}

fn which(name: &str) -> Outcome {
    match find_executable(name) {
        Some(path) => Outcome::ok(path.display().to_string(), json!({ "name": name, "path": path })),
        None => Outcome::user_error(
            format!("{name} not found on PATH"),
            json!({ "name": name, "path": Value::Null }),
        ),
    }
}

fn store_command(store: &mut ProvenanceStore, command: &StoreCommand) -> Result<Outcome> {
    match command {
        StoreCommand::Init => {
            store.verify_schema()?;
            Ok(Outcome::ok(
                format!("provenance store ready at {}", store.path().display()),
                json!({ "path": store.path() }),
            ))
        }
        StoreCommand::List => {
            let records = store.boot_records()?;
            let message = records
                .iter()
                .map(|record| {
                    let package = record
                        .package
                        .as_ref()
                        .map_or_else(|| "-".to_string(), |p| format!("{} {}", p.package_type, p.file_path));
                    format!("{:>4} {} {}", record.boot.id, record.boot.boot_hash, package)
                })
                .collect::<Vec<_>>()
                .join("\n");
            Ok(Outcome::ok(message, json!({ "records": records })))
        }
        StoreCommand::Track(args) => track(store, args),
        StoreCommand::Purge(PurgeArgs { boot, package }) => {
            let (kind, id, removed) = match (boot, package) {
                (Some(id), _) => ("boot", *id, store.purge_boot(*id)?),
                (None, Some(id)) => ("package", *id, store.purge_package(*id)?),
                (None, None) => {
                    return Ok(Outcome::user_error(
                        "pass --boot ID or --package ID",
                        Value::Null,
                    ))
                }
            };
            let details = json!({ "kind": kind, "id": id, "removed": removed });
            Ok(if removed {
                Outcome::ok(format!("purged {kind} {id}"), details)
            } else {
                Outcome::user_error(format!("no {kind} with id {id}"), details)
            })
        }
    }
}

/// Tracking reuses rows that already exist, so repeating it reports
/// `new_boot`/`new_package`/`linked` as `false` rather than failing.
fn track(store: &mut ProvenanceStore, args: &TrackArgs) -> Result<Outcome> {
    let boot_hash = scan::sha1_file(&args.boot)?;
    let epoch = epoch_now();
    let package = NewPackage {
        boot_hash: boot_hash.clone(),
        package_type: match args.kind {
            PackageKindArg::Firmware => PackageType::Firmware,
            PackageKindArg::Rom => PackageType::Rom,
        },
        package_sig: args.sig.clone(),
        file_path: args.package.display().to_string(),
        epoch,
    };
    let boot = NewBoot {
        boot_hash: boot_hash.clone(),
        file_path: args.boot.display().to_string(),
        is_patched: args.patched,
        magisk_version: args.magisk.clone(),
        hardware: args.hardware.clone(),
        epoch,
    };
    let tracked = store.track_boot_image(&package, &boot)?;
    Ok(Outcome::ok(
        format!("tracked boot {boot_hash} (id {})", tracked.boot.id),
        json!({
            "boot_hash": boot_hash,
            "boot_id": tracked.boot.id,
            "package_id": tracked.package.id,
            "new_boot": tracked.boot.inserted,
            "new_package": tracked.package.inserted,
            "linked": tracked.linked,
        }),
    ))
}
