// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.
//
// Copyright (c) 2025 Pegasus Heavy Industries, LLC

//! File and directory loading

use crate::engine::{execute, ExecuteOptions, Exports};
use crate::error::Result;
use crate::wrapper::{ModuleKind, MODULE_EXTENSIONS};
use futures::future::LocalBoxFuture;
use futures::FutureExt;
use std::path::{Path, PathBuf};

/// Execute a module file and return its exports.
///
/// The file's own name and parent directory become the module's
/// `__filename` and `__dirname`, and its extension selects the wrapping
/// kind unless `options.kind` overrides it.
pub async fn load_file(path: impl AsRef<Path>, options: ExecuteOptions) -> Result<Exports> {
    let path = path.as_ref();
    let source = tokio::fs::read_to_string(path).await?;

    let mut options = options;
    if options.kind.is_none() {
        options.kind = Some(ModuleKind::from_path(path));
    }
    if options.filename.is_none() {
        options.filename = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned());
    }
    if options.directory.is_none() {
        options.directory = path.parent().map(Path::to_path_buf);
    }

    tracing::debug!(path = %path.display(), "loading module from file");
    execute(&source, options)
}

/// Execute every recognized module file in a directory and collect the
/// exports into a map keyed by file stem.
///
/// Files with unrecognized extensions are skipped. With `deep`,
/// subdirectories recurse into nested maps keyed by directory name;
/// without it they are skipped. Entries load concurrently but on the
/// current task, since execution contexts are bound to one thread.
pub async fn load_directory(
    path: impl AsRef<Path>,
    options: ExecuteOptions,
    deep: bool,
) -> Result<serde_json::Map<String, serde_json::Value>> {
    load_directory_inner(path.as_ref().to_path_buf(), options, deep).await
}

fn load_directory_inner(
    path: PathBuf,
    options: ExecuteOptions,
    deep: bool,
) -> LocalBoxFuture<'static, Result<serde_json::Map<String, serde_json::Value>>> {
    async move {
        let mut entries = Vec::new();
        let mut reader = tokio::fs::read_dir(&path).await?;
        while let Some(entry) = reader.next_entry().await? {
            let file_type = entry.file_type().await?;
            entries.push((entry.path(), file_type.is_dir()));
        }
        entries.sort();

        let mut loads = Vec::new();
        for (entry_path, is_dir) in entries {
            if is_dir {
                if deep {
                    let key = entry_path
                        .file_name()
                        .map(|name| name.to_string_lossy().into_owned())
                        .unwrap_or_default();
                    let options = options.clone();
                    loads.push(
                        async move {
                            let nested =
                                load_directory_inner(entry_path, options, deep).await?;
                            Ok::<_, crate::error::SandcellError>((
                                key,
                                serde_json::Value::Object(nested),
                            ))
                        }
                        .boxed_local(),
                    );
                }
                continue;
            }

            let recognized = entry_path
                .extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| MODULE_EXTENSIONS.contains(&ext));
            if !recognized {
                continue;
            }

            let key = entry_path
                .file_stem()
                .map(|stem| stem.to_string_lossy().into_owned())
                .unwrap_or_default();
            let options = options.clone();
            loads.push(
                async move {
                    let exports = load_file(&entry_path, options).await?;
                    Ok((key, exports))
                }
                .boxed_local(),
            );
        }

        let loaded = futures::future::try_join_all(loads).await?;
        Ok(loaded.into_iter().collect())
    }
    .boxed_local()
}
