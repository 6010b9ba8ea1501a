use kata_rpc::{
    from_row, to_row, AuthenticatedContext, Issues, Pipeline, RouterBuilder, RpcError, RpcResult,
    Validate,
};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::task::JoinSet;

use super::models::{Upload, UPLOADS};
use crate::blob::{object_key, BlobStore, PresignedPut};

pub const MAX_FILES: usize = 10;
pub const MAX_FILE_BYTES: u64 = 25 * 1024 * 1024;

pub fn router(pipeline: &Pipeline, blobs: Arc<dyn BlobStore>) -> RouterBuilder {
    RouterBuilder::new().procedure(
        "presign",
        pipeline
            .protected()
            .mutation(move |ctx: AuthenticatedContext, input: PresignUploads| {
                presign(blobs.clone(), ctx, input)
            }),
    )
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct FileSpec {
    pub name: String,
    pub content_type: String,
    pub size: u64,
}

#[derive(Debug, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct PresignUploads {
    pub files: Vec<FileSpec>,
}

impl Validate for PresignUploads {
    fn validate(&self, issues: &mut Issues) {
        issues.check(!self.files.is_empty(), "files", "required", "at least one file");
        issues.check(
            self.files.len() <= MAX_FILES,
            "files",
            "too_many",
            "at most 10 files per request",
        );
        for (idx, file) in self.files.iter().enumerate() {
            let field = format!("files[{idx}]");
            issues.require_non_empty(&format!("{field}.name"), &file.name);
            issues.max_chars(&format!("{field}.name"), &file.name, 255);
            issues.check(
                file.content_type.contains('/'),
                &format!("{field}.contentType"),
                "format",
                "must be a MIME type",
            );
            issues.check(
                file.size > 0 && file.size <= MAX_FILE_BYTES,
                &format!("{field}.size"),
                "range",
                "must be between 1 byte and 25 MiB",
            );
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PresignedUpload {
    pub upload_id: String,
    pub key: String,
    pub url: String,
    pub expires_ms: u64,
}

/// Presigns every file concurrently. Rows are written only once all
/// presigns succeed; the first failure drops the rest.
async fn presign(
    blobs: Arc<dyn BlobStore>,
    ctx: AuthenticatedContext,
    input: PresignUploads,
) -> RpcResult<Vec<PresignedUpload>> {
    let owner_id = ctx.session.user.id.clone();
    let mut keys = Vec::with_capacity(input.files.len());
    for file in &input.files {
        keys.push(object_key(&owner_id, &file.name)?);
    }

    let mut set: JoinSet<(usize, anyhow::Result<PresignedPut>)> = JoinSet::new();
    for (idx, (file, key)) in input.files.iter().zip(&keys).enumerate() {
        let blobs = blobs.clone();
        let key = key.clone();
        let content_type = file.content_type.clone();
        set.spawn(async move { (idx, blobs.presign_put(&key, &content_type).await) });
    }

    let mut signed: Vec<Option<PresignedPut>> = vec![None; input.files.len()];
    while let Some(joined) = set.join_next().await {
        let (idx, result) =
            joined.map_err(|err| RpcError::internal(format!("presign task failed: {err}")))?;
        let put = result.map_err(|err| {
            RpcError::Internal(err.context(format!("presign of file {idx} failed")))
        })?;
        signed[idx] = Some(put);
    }

    let mut out = Vec::with_capacity(keys.len());
    for ((file, key), put) in input.files.into_iter().zip(keys).zip(signed) {
        let put = put.ok_or_else(|| RpcError::internal("presign result missing"))?;
        let upload = Upload {
            id: String::new(),
            key: key.clone(),
            file_name: file.name,
            content_type: file.content_type,
            size: file.size,
            owner_id: owner_id.clone(),
        };
        let stored: Upload = from_row(ctx.db.insert(UPLOADS, to_row(&upload)?).await?)?;
        out.push(PresignedUpload {
            upload_id: stored.id,
            key,
            url: put.url,
            expires_ms: put.expires_ms,
        });
    }
    Ok(out)
}
