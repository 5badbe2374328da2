//! Photo commands: batch import and duplication, soft delete/restore, move, order,
//! metadata edits, rotation and source-file consolidation.

use std::path::PathBuf;

use async_trait::async_trait;
use serde_json::Value;

use super::registry::{CommandInfo, RegistryBuilder};
use super::{result, Context, Exec};
use crate::action::params::{
    FieldUpdate, ItemPhotos, ItemPhotosAdd, PhotoConsolidatePayload, PhotoCreatePayload,
    PhotoFields, PhotoMovePayload, PhotoPatch, PhotoRestorePayload, PhotoRotatePayload,
    PhotoSavePayload, PhotosOfItem,
};
use crate::action::{self, ActionType};
use crate::error::{CommandError, ConfigError, DbError, ImageError};
use crate::image::{self, ImageInfo};
use crate::model::{self, photo::Photo, splice_at};
use crate::prompt::PromptKind;

pub fn register(builder: &mut RegistryBuilder) -> Result<(), ConfigError> {
    builder
        .register::<PhotoCreate, PhotoCreatePayload>(
            ActionType::PhotoCreate,
            CommandInfo {
                description: "Import image files into an item",
                undoable: true,
            },
        )?
        .register::<PhotoDuplicate, PhotosOfItem>(
            ActionType::PhotoDuplicate,
            CommandInfo {
                description: "Copy photos within their item",
                undoable: true,
            },
        )?
        .register::<PhotoDelete, PhotosOfItem>(
            ActionType::PhotoDelete,
            CommandInfo {
                description: "Move photos to the trash",
                undoable: true,
            },
        )?
        .register::<PhotoRestore, PhotoRestorePayload>(
            ActionType::PhotoRestore,
            CommandInfo {
                description: "Restore trashed photos at their former positions",
                undoable: true,
            },
        )?
        .register::<PhotoMove, PhotoMovePayload>(
            ActionType::PhotoMove,
            CommandInfo {
                description: "Move photos to another item",
                undoable: true,
            },
        )?
        .register::<PhotoOrder, PhotosOfItem>(
            ActionType::PhotoOrder,
            CommandInfo {
                description: "Set the display order of an item's photos",
                undoable: true,
            },
        )?
        .register::<PhotoSave, PhotoSavePayload>(
            ActionType::PhotoSave,
            CommandInfo {
                description: "Edit photo title and date",
                undoable: true,
            },
        )?
        .register::<PhotoRotate, PhotoRotatePayload>(
            ActionType::PhotoRotate,
            CommandInfo {
                description: "Rotate a photo clockwise",
                undoable: true,
            },
        )?
        .register::<PhotoConsolidate, PhotoConsolidatePayload>(
            ActionType::PhotoConsolidate,
            CommandInfo {
                description: "Verify photo files and flag broken sources",
                undoable: false,
            },
        )?
        .register::<PhotoLoad, Vec<i64>>(
            ActionType::PhotoLoad,
            CommandInfo {
                description: "Load photos into memory",
                undoable: false,
            },
        )?;
    Ok(())
}

fn project_base(ctx: &Context) -> Option<PathBuf> {
    ctx.select(|s| s.project.as_ref().and_then(|p| p.base.clone()))
}

fn to_u64(value: i64) -> Option<u64> {
    u64::try_from(value).ok()
}

// ── Import ──────────────────────────────────────────────────────

/// Photos written by one import batch. Each photo commits on its own, so a
/// batch cut short purges everything it created past `floor`, including a
/// write whose result never arrived.
#[derive(Debug, Default)]
struct Batch {
    item: i64,
    floor: i64,
    checksums: Vec<String>,
}

impl Batch {
    /// Check `item` and mark where the batch starts. Returns the item's
    /// current order and checksums.
    async fn start(&mut self, ctx: &Context, item: i64) -> Result<(Vec<i64>, Vec<String>), CommandError> {
        let (exists, floor, order, known) = ctx
            .db()
            .call(move |c| {
                Ok((
                    model::item::exists(c, item)?,
                    model::last_subject(c)?,
                    model::photo::order(c, item)?,
                    model::photo::checksums(c, item)?,
                ))
            })
            .await?;
        if !exists {
            return Err(CommandError::not_found(format!("item {item}")));
        }
        self.item = item;
        self.floor = floor;
        Ok((order, known))
    }

    /// Insert one probed image at `position`, copying `fields` when given.
    async fn insert(
        &mut self,
        ctx: &Context,
        image: ImageInfo,
        position: usize,
        fields: Option<PhotoFields>,
    ) -> Result<Photo, CommandError> {
        let item = self.item;
        self.checksums.push(image.checksum.clone());
        let photo = ctx
            .db()
            .transaction(move |tx| {
                let mut photo = model::photo::create(tx, item, &image, position)?;
                if let Some(fields) = fields {
                    model::photo::save(tx, photo.id, &fields)?;
                    photo = model::photo::get(tx, photo.id)?.unwrap_or(photo);
                }
                model::item::touch(tx, item)?;
                Ok(photo)
            })
            .await?;
        ctx.put(action::photo::insert(std::slice::from_ref(&photo)));
        Ok(photo)
    }

    /// Splice `photos` into `order` at `start`, store it, and record the inverse pair.
    async fn finish(
        &self,
        ctx: &mut Context,
        mut order: Vec<i64>,
        start: usize,
        photos: &[Photo],
    ) -> Result<(), CommandError> {
        let item = self.item;
        let ids: Vec<i64> = photos.iter().map(|p| p.id).collect();
        order.splice(start..start, ids.iter().copied());
        ctx.db()
            .transaction(move |tx| model::photo::set_order(tx, item, &order))
            .await?;

        ctx.put(action::item::photos_add(&ItemPhotosAdd {
            id: item,
            photos: ids.clone(),
            idx: Some(start),
        }));

        ctx.set_undo(action::photo::delete(&PhotosOfItem {
            item,
            photos: ids.clone(),
        }));
        ctx.set_redo(action::photo::restore(&PhotoRestorePayload {
            item,
            idx: (start..start + ids.len()).collect(),
            photos: ids,
        }));
        Ok(())
    }

    async fn rollback(&self, ctx: &Context) {
        if self.checksums.is_empty() {
            return;
        }
        let (item, floor, checksums) = (self.item, self.floor, self.checksums.clone());
        let purged = ctx
            .db()
            .transaction(move |tx| {
                let ids = model::photo::created_since(tx, item, floor, &checksums)?;
                model::photo::purge(tx, &ids)?;
                Ok(ids)
            })
            .await;
        match purged {
            Ok(ids) if ids.is_empty() => {}
            Ok(ids) => {
                tracing::info!(item, count = ids.len(), "rolled back unfinished import");
                ctx.put(action::photo::remove(&ids));
            }
            Err(e) => tracing::warn!(item, "failed to roll back unfinished import: {e}"),
        }
    }
}

#[derive(Debug, Default)]
pub struct PhotoCreate {
    batch: Batch,
}

/// Probe and insert one file. `Ok(None)` when the item already holds the same image.
async fn import_one(
    ctx: &Context,
    batch: &mut Batch,
    file: PathBuf,
    base: Option<PathBuf>,
    known: &[String],
    position: usize,
) -> Result<Option<Photo>, CommandError> {
    let image = image::probe(file, base).await?;
    if known.contains(&image.checksum) {
        tracing::debug!(path = %image.path.display(), "skipping duplicate photo");
        return Ok(None);
    }
    Ok(Some(batch.insert(ctx, image, position, None).await?))
}

#[async_trait]
impl Exec for PhotoCreate {
    async fn exec(&mut self, ctx: &mut Context) -> Result<Value, CommandError> {
        let payload: PhotoCreatePayload = ctx.payload()?;
        let item = payload.item;

        let files = match payload.files {
            Some(files) => files,
            None => match ctx.prompt_files(PromptKind::Images).await? {
                Some(files) => files,
                None => return Ok(result(&Vec::<Photo>::new())),
            },
        };

        let (order, mut known) = self.batch.start(ctx, item).await?;
        let base = project_base(ctx);
        let start = payload.idx.unwrap_or(order.len()).min(order.len());
        let total = files.len();
        let mut photos: Vec<Photo> = Vec::new();

        for (i, file) in files.into_iter().enumerate() {
            ctx.check_cancelled()?;
            let display = file.display().to_string();
            let position = start + photos.len();
            match import_one(ctx, &mut self.batch, file, base.clone(), &known, position).await {
                Ok(Some(photo)) => {
                    known.push(photo.checksum.clone());
                    photos.push(photo);
                }
                Ok(None) => {}
                Err(e) => {
                    ctx.warn(&format!("failed to import {display}: {e}"));
                    ctx.fail(&e);
                }
            }
            ctx.progress(total, i + 1);
        }

        if !photos.is_empty() {
            self.batch.finish(ctx, order, start, &photos).await?;
        }
        Ok(result(&photos))
    }

    async fn abort(&mut self, ctx: &mut Context, _error: &CommandError) {
        self.batch.rollback(ctx).await;
    }
}

/// Copy photos within their item, right after the first of them.
#[derive(Debug, Default)]
pub struct PhotoDuplicate {
    batch: Batch,
}

async fn duplicate_one(
    ctx: &Context,
    batch: &mut Batch,
    original: &Photo,
    base: Option<PathBuf>,
    position: usize,
) -> Result<Photo, CommandError> {
    let image = image::probe(original.path.clone(), base).await?;
    let fields = original.fields_like(&PhotoFields {
        title: Some(FieldUpdate::Clear),
        date: Some(FieldUpdate::Clear),
    });
    batch.insert(ctx, image, position, Some(fields)).await
}

#[async_trait]
impl Exec for PhotoDuplicate {
    async fn exec(&mut self, ctx: &mut Context) -> Result<Value, CommandError> {
        let PhotosOfItem { item, photos } = ctx.payload()?;
        let Some(&first) = photos.first() else {
            return Err(CommandError::Validation("no photos to duplicate".into()));
        };

        let (order, _) = self.batch.start(ctx, item).await?;
        let ids = photos.clone();
        let mut originals = ctx.db().call(move |c| model::photo::load(c, &ids)).await?;
        originals.sort_by_key(|p| photos.iter().position(|id| *id == p.id));
        if let Some(stray) = originals.iter().find(|p| p.item != item) {
            return Err(CommandError::Validation(format!(
                "photo {} is not in item {item}",
                stray.id
            )));
        }

        let start = order
            .iter()
            .position(|o| *o == first)
            .map_or(order.len(), |at| at + 1);
        let base = project_base(ctx);
        let total = originals.len();
        let mut copies: Vec<Photo> = Vec::new();

        for (i, original) in originals.iter().enumerate() {
            ctx.check_cancelled()?;
            let position = start + copies.len();
            match duplicate_one(ctx, &mut self.batch, original, base.clone(), position).await {
                Ok(photo) => copies.push(photo),
                Err(e) => {
                    ctx.warn(&format!("failed to duplicate {}: {e}", original.path.display()));
                    ctx.fail(&e);
                }
            }
            ctx.progress(total, i + 1);
        }

        if !copies.is_empty() {
            self.batch.finish(ctx, order, start, &copies).await?;
        }
        Ok(result(&copies))
    }

    async fn abort(&mut self, ctx: &mut Context, _error: &CommandError) {
        self.batch.rollback(ctx).await;
    }
}

// ── Delete / restore ────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct PhotoDelete;

#[async_trait]
impl Exec for PhotoDelete {
    async fn exec(&mut self, ctx: &mut Context) -> Result<Value, CommandError> {
        let PhotosOfItem { item, photos } = ctx.payload()?;
        let ids = photos.clone();

        let idx = ctx
            .db()
            .transaction(move |tx| {
                let mut order = model::photo::order(tx, item)?;
                let idx = ids
                    .iter()
                    .map(|id| {
                        order.iter().position(|o| o == id).ok_or_else(|| {
                            DbError::Invalid(format!("photo {id} is not in item {item}"))
                        })
                    })
                    .collect::<Result<Vec<usize>, DbError>>()?;
                model::photo::delete(tx, &ids)?;
                order.retain(|o| !ids.contains(o));
                model::photo::set_order(tx, item, &order)?;
                model::item::touch(tx, item)?;
                Ok(idx)
            })
            .await?;

        ctx.put(action::item::photos_remove(&ItemPhotos {
            id: item,
            photos: photos.clone(),
        }));

        ctx.set_undo(action::photo::restore(&PhotoRestorePayload {
            item,
            photos: photos.clone(),
            idx,
        }));
        Ok(result(&photos))
    }
}

#[derive(Debug, Default)]
pub struct PhotoRestore;

#[async_trait]
impl Exec for PhotoRestore {
    async fn exec(&mut self, ctx: &mut Context) -> Result<Value, CommandError> {
        let PhotoRestorePayload { item, photos, idx } = ctx.payload()?;
        if idx.len() != photos.len() {
            return Err(CommandError::Validation(format!(
                "{} positions given for {} photos",
                idx.len(),
                photos.len()
            )));
        }
        let ids = photos.clone();

        let (order, restored) = ctx
            .db()
            .transaction(move |tx| {
                model::photo::restore(tx, &ids)?;
                let mut order = model::photo::order(tx, item)?;
                order.retain(|o| !ids.contains(o));
                splice_at(&mut order, &ids, &idx);
                model::photo::set_order(tx, item, &order)?;
                model::item::touch(tx, item)?;
                Ok((order, model::photo::load(tx, &ids)?))
            })
            .await?;

        ctx.put(action::photo::insert(&restored));
        ctx.put(action::item::update(&ItemPhotos {
            id: item,
            photos: order,
        }));

        ctx.set_undo(action::photo::delete(&PhotosOfItem {
            item,
            photos: photos.clone(),
        }));
        Ok(result(&photos))
    }
}

// ── Move / order ────────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct PhotoMove;

#[async_trait]
impl Exec for PhotoMove {
    async fn exec(&mut self, ctx: &mut Context) -> Result<Value, CommandError> {
        let PhotoMovePayload { item: target, photos, idx } = ctx.payload()?;
        let Some(&first) = photos.first() else {
            return Err(CommandError::Validation("no photos to move".into()));
        };
        let ids = photos.clone();

        let (source, original, at) = ctx
            .db()
            .transaction(move |tx| {
                let sources = model::photo::items_of(tx, &ids)?;
                let source = sources.first().copied().unwrap_or(target);
                if sources.iter().any(|s| *s != source) {
                    return Err(DbError::Invalid("photos must come from one item".into()));
                }
                if source == target {
                    return Err(DbError::Invalid(format!("photos already belong to item {target}")));
                }

                let mut from = model::photo::order(tx, source)?;
                let original = from.iter().position(|o| *o == first).unwrap_or(from.len());
                from.retain(|o| !ids.contains(o));

                let mut to = model::photo::order(tx, target)?;
                let at = idx.unwrap_or(to.len()).min(to.len());
                to.splice(at..at, ids.iter().copied());

                model::photo::move_to(tx, &ids, target)?;
                model::photo::set_order(tx, source, &from)?;
                model::photo::set_order(tx, target, &to)?;
                model::item::touch(tx, source)?;
                model::item::touch(tx, target)?;
                Ok((source, original, at))
            })
            .await?;

        let patches: Vec<PhotoPatch> = photos
            .iter()
            .map(|id| PhotoPatch {
                item: Some(target),
                ..PhotoPatch::new(*id)
            })
            .collect();
        ctx.put(action::photo::bulk_update(&patches));
        ctx.put(action::item::photos_remove(&ItemPhotos {
            id: source,
            photos: photos.clone(),
        }));
        ctx.put(action::item::photos_add(&ItemPhotosAdd {
            id: target,
            photos: photos.clone(),
            idx: Some(at),
        }));

        ctx.set_undo(action::photo::move_to(&PhotoMovePayload {
            item: source,
            photos: photos.clone(),
            idx: Some(original),
        }));
        Ok(result(&photos))
    }
}

#[derive(Debug, Default)]
pub struct PhotoOrder;

#[async_trait]
impl Exec for PhotoOrder {
    async fn exec(&mut self, ctx: &mut Context) -> Result<Value, CommandError> {
        let PhotosOfItem { item, photos } = ctx.payload()?;
        let order = photos.clone();

        let previous = ctx
            .db()
            .transaction(move |tx| {
                let previous = model::photo::order(tx, item)?;
                let mut a = previous.clone();
                let mut b = order.clone();
                a.sort_unstable();
                b.sort_unstable();
                if a != b {
                    return Err(DbError::Invalid(format!(
                        "order is not a permutation of the photos of item {item}"
                    )));
                }
                model::photo::set_order(tx, item, &order)?;
                model::item::touch(tx, item)?;
                Ok(previous)
            })
            .await?;

        ctx.put(action::item::update(&ItemPhotos {
            id: item,
            photos: photos.clone(),
        }));

        ctx.set_undo(action::photo::order(&PhotosOfItem {
            item,
            photos: previous,
        }));
        Ok(result(&photos))
    }
}

// ── Edits ───────────────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct PhotoSave;

#[async_trait]
impl Exec for PhotoSave {
    async fn exec(&mut self, ctx: &mut Context) -> Result<Value, CommandError> {
        let PhotoSavePayload { id, data } = ctx.payload()?;
        let fields = data.clone();

        let before = ctx
            .db()
            .transaction(move |tx| {
                let Some(photo) = model::photo::get(tx, id)? else {
                    return Ok(None);
                };
                let before = photo.fields_like(&fields);
                model::photo::save(tx, id, &fields)?;
                Ok(Some(before))
            })
            .await?
            .ok_or_else(|| CommandError::not_found(format!("photo {id}")))?;

        ctx.put(action::photo::update(&PhotoPatch {
            fields: data.clone(),
            ..PhotoPatch::new(id)
        }));

        ctx.set_undo(action::photo::save(&PhotoSavePayload { id, data: before }));
        Ok(result(&data))
    }
}

#[derive(Debug, Default)]
pub struct PhotoRotate;

#[async_trait]
impl Exec for PhotoRotate {
    async fn exec(&mut self, ctx: &mut Context) -> Result<Value, CommandError> {
        let PhotoRotatePayload { id, by } = ctx.payload()?;
        let rotation = ctx
            .db()
            .transaction(move |tx| model::photo::rotate(tx, id, by))
            .await?;

        ctx.put(action::photo::bulk_update(&[PhotoPatch {
            rotation: Some(rotation),
            ..PhotoPatch::new(id)
        }]));

        ctx.set_undo(action::photo::rotate(&PhotoRotatePayload { id, by: -by }));
        Ok(result(&rotation))
    }
}

// ── Consolidation ───────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct PhotoConsolidate;

fn is_missing(error: &ImageError) -> bool {
    matches!(error, ImageError::Read { source, .. } if source.kind() == std::io::ErrorKind::NotFound)
}

async fn store_consolidated(
    ctx: &Context,
    id: i64,
    image: Option<ImageInfo>,
    broken: bool,
) -> Result<PhotoPatch, CommandError> {
    let mut patch = PhotoPatch {
        broken: Some(broken),
        ..PhotoPatch::new(id)
    };
    if let Some(image) = &image {
        patch.path = Some(image.path.clone());
        patch.checksum = Some(image.checksum.clone());
        patch.size = Some(image.size);
    }
    let at = ctx
        .db()
        .call(move |c| model::photo::consolidate(c, id, image.as_ref(), broken))
        .await?;
    patch.consolidated = to_u64(at);
    Ok(patch)
}

/// Check one photo against its file. `Ok(None)` when nothing changed.
async fn consolidate_one(
    ctx: &Context,
    id: i64,
    base: Option<PathBuf>,
    force: bool,
    prompt: bool,
) -> Result<Option<PhotoPatch>, CommandError> {
    let photo = ctx
        .db()
        .call(move |c| model::photo::get(c, id))
        .await?
        .ok_or_else(|| CommandError::not_found(format!("photo {id}")))?;

    match image::probe(photo.path.clone(), base.clone()).await {
        Ok(image) => {
            let changed = image.checksum != photo.checksum;
            if !changed && !force && !photo.broken {
                return Ok(None);
            }
            if changed {
                ctx.warn(&format!("photo {id} changed on disk"));
            }
            let image = ImageInfo {
                path: photo.path.clone(),
                ..image
            };
            store_consolidated(ctx, id, Some(image), false).await.map(Some)
        }
        Err(e) if is_missing(&e) => {
            if prompt {
                let relocated = ctx
                    .prompt_files(PromptKind::Relocate)
                    .await?
                    .and_then(|files| files.into_iter().next());
                if let Some(path) = relocated {
                    let image = image::probe(path, base).await?;
                    if image.checksum != photo.checksum {
                        ctx.warn(&format!("relocated file for photo {id} has different content"));
                    }
                    return store_consolidated(ctx, id, Some(image), false).await.map(Some);
                }
            }
            if photo.broken && !force {
                return Ok(None);
            }
            ctx.warn(&format!("photo {id} is missing: {}", photo.path.display()));
            store_consolidated(ctx, id, None, true).await.map(Some)
        }
        Err(e) => Err(e.into()),
    }
}

#[async_trait]
impl Exec for PhotoConsolidate {
    async fn exec(&mut self, ctx: &mut Context) -> Result<Value, CommandError> {
        let payload: PhotoConsolidatePayload = ctx.payload()?;
        let ids = if payload.photos.is_empty() {
            ctx.db().call(|c| model::photo::all(c)).await?
        } else {
            payload.photos
        };

        let base = project_base(ctx);
        let total = ids.len();
        let mut patches = Vec::new();

        for (i, id) in ids.iter().copied().enumerate() {
            ctx.check_cancelled()?;
            match consolidate_one(ctx, id, base.clone(), payload.force, payload.prompt).await {
                Ok(Some(patch)) => patches.push(patch),
                Ok(None) => {}
                Err(e) if e.is_cancellation() => return Err(e),
                Err(e) => {
                    ctx.warn(&format!("failed to consolidate photo {id}: {e}"));
                    ctx.fail(&e);
                }
            }
            ctx.progress(total, i + 1);
        }

        if !patches.is_empty() {
            ctx.put(action::photo::bulk_update(&patches));
        }
        Ok(result(&patches))
    }
}

// ── Load ────────────────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct PhotoLoad;

#[async_trait]
impl Exec for PhotoLoad {
    async fn exec(&mut self, ctx: &mut Context) -> Result<Value, CommandError> {
        let ids: Vec<i64> = ctx.payload()?;
        let photos = ctx.db().seq(move |tx| model::photo::load(tx, &ids)).await?;
        ctx.put(action::photo::insert(&photos));
        Ok(result(&photos.iter().map(|p| p.id).collect::<Vec<_>>()))
    }
}
