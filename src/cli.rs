//! # Offline commands
//!
//! Subcommands that work on the studio folder directly, without a server.
use crate::compile::CompileMode;
use crate::config::Folder;
use crate::history::{CheckpointStore, Lineage};
use crate::manuscript::{
    Assembler, DocumentId, DocumentSource, DocumentStore, Entity, EntityId, EntityKind,
    EntityUpdate, ExportFormat, FileKind, Progress,
};
use crate::model::Node;
use color_eyre::eyre::{eyre, WrapErr};
use color_eyre::Result;
use std::path::PathBuf;
use tracing::{info, instrument};

fn open_store(folder: &Folder, project: &str) -> Result<DocumentStore> {
    let dir = folder
        .project(project)
        .ok_or_else(|| eyre!("Invalid project name {:?}", project))?;
    Ok(DocumentStore::new(dir))
}

/// Compile all chapters of a project and write the manuscript file
#[instrument(skip(folder))]
pub async fn compile(
    folder: &Folder,
    project: &str,
    mode: CompileMode,
    format: ExportFormat,
    out: Option<PathBuf>,
) -> Result<PathBuf> {
    let store = open_store(folder, project)?;
    let chapters = store
        .project()
        .await
        .wrap_err("Could not read project")?
        .chapters();
    let assembler = Assembler::new(store);
    let export = assembler
        .export(&chapters, mode, format, |p: Progress| {
            info!("Compiled {}/{} chapters", p.done, p.total)
        })
        .await
        .wrap_err("Could not assemble manuscript")?;

    let path = out.unwrap_or_else(|| PathBuf::from(&export.file_name));
    tokio::fs::write(&path, export.markup.as_bytes())
        .await
        .wrap_err_with(|| format!("Could not write {}", path.display()))?;
    info!(mime = export.mime, "Wrote {}", path.display());
    Ok(path)
}

/// The checkpoint tree of a document, as text
#[instrument(skip(folder))]
pub async fn history(folder: &Folder, project: &str, doc: DocumentId) -> Result<String> {
    let store = open_store(folder, project)?;
    let manifest = store.project().await.wrap_err("Could not read project")?;
    let file = manifest
        .get(doc)
        .ok_or_else(|| eyre!("Document {} is not part of {:?}", doc, project))?;

    let history = CheckpointStore::open(store.dir().history_table(doc))
        .await
        .wrap_err("Could not open history")?;
    let checkpoints = history.list().await?;

    let mut out = format!("{} ({} checkpoints)\n", file.title, checkpoints.len());
    out.push_str(&Lineage::new(&checkpoints).render(None));
    Ok(out)
}

/// Add a document to a project, creating the project if needed
#[instrument(skip(folder))]
pub async fn new_doc(
    folder: &Folder,
    project: &str,
    title: &str,
    kind: FileKind,
) -> Result<DocumentId> {
    let store = open_store(folder, project)?;
    store.init().await.wrap_err("Could not create project")?;
    let mut manifest = store.project().await?;
    let id = manifest.create(title, kind).id;
    store.save_project(&manifest).await?;
    if kind != FileKind::Folder {
        store.write(id, &Node::empty()).await?;
    }
    info!("Created {} {}", kind, id);
    Ok(id)
}

/// Change the title of a document
#[instrument(skip(folder))]
pub async fn rename_doc(folder: &Folder, project: &str, doc: DocumentId, title: &str) -> Result<()> {
    let store = open_store(folder, project)?;
    let mut manifest = store.project().await.wrap_err("Could not read project")?;
    if !manifest.rename(doc, title) {
        return Err(eyre!("Document {} is not part of {:?}", doc, project));
    }
    store.save_project(&manifest).await?;
    info!("Renamed {} to {:?}", doc, title);
    Ok(())
}

/// Drop a document from the manifest and delete its files
#[instrument(skip(folder))]
pub async fn remove_doc(folder: &Folder, project: &str, doc: DocumentId) -> Result<()> {
    let store = open_store(folder, project)?;
    let mut manifest = store.project().await.wrap_err("Could not read project")?;
    let file = manifest
        .remove(doc)
        .ok_or_else(|| eyre!("Document {} is not part of {:?}", doc, project))?;
    store.save_project(&manifest).await?;

    if store.exists(doc).await {
        tokio::fs::remove_file(store.dir().doc_path(doc))
            .await
            .wrap_err("Could not delete document content")?;
    }
    let history = store.dir().history_dir(doc);
    if tokio::fs::metadata(&history).await.is_ok() {
        tokio::fs::remove_dir_all(&history)
            .await
            .wrap_err("Could not delete document history")?;
    }
    info!("Removed {} {:?}", file.kind, file.title);
    Ok(())
}

fn entity_lines<'a, I>(entities: I) -> String
where
    I: IntoIterator<Item = &'a Entity>,
{
    let mut out = String::new();
    for entity in entities {
        let kind = entity.kind.to_string();
        out.push_str(&format!("{} {:<9} {}", entity.id, kind, entity.name));
        if !entity.description.is_empty() {
            out.push_str(&format!(" ({})", entity.description));
        }
        out.push('\n');
    }
    out
}

/// The codex of a project, one entity per line
#[instrument(skip(folder))]
pub async fn codex(folder: &Folder, project: &str) -> Result<String> {
    let store = open_store(folder, project)?;
    let codex = store.codex().await.wrap_err("Could not read codex")?;
    Ok(entity_lines(codex.entities()))
}

/// Add an entity to the codex, creating the project if needed
#[instrument(skip(folder))]
pub async fn codex_add(
    folder: &Folder,
    project: &str,
    name: &str,
    kind: EntityKind,
    description: &str,
) -> Result<EntityId> {
    if name.trim().is_empty() {
        return Err(eyre!("An entity needs a name"));
    }
    let store = open_store(folder, project)?;
    store.init().await.wrap_err("Could not create project")?;
    let mut codex = store.codex().await.wrap_err("Could not read codex")?;
    let id = codex.add(name, kind, description).id;
    store.save_codex(&codex).await?;
    info!("Added {} {}", kind, id);
    Ok(id)
}

/// Change an entity of the codex
#[instrument(skip(folder))]
pub async fn codex_edit(
    folder: &Folder,
    project: &str,
    id: EntityId,
    update: EntityUpdate,
) -> Result<()> {
    if matches!(&update.name, Some(name) if name.trim().is_empty()) {
        return Err(eyre!("An entity needs a name"));
    }
    let store = open_store(folder, project)?;
    let mut codex = store.codex().await.wrap_err("Could not read codex")?;
    if !codex.update(id, update) {
        return Err(eyre!("Entity {} is not part of {:?}", id, project));
    }
    store.save_codex(&codex).await?;
    info!("Updated {}", id);
    Ok(())
}

/// Remove an entity from the codex
#[instrument(skip(folder))]
pub async fn codex_remove(folder: &Folder, project: &str, id: EntityId) -> Result<()> {
    let store = open_store(folder, project)?;
    let mut codex = store.codex().await.wrap_err("Could not read codex")?;
    let entity = codex
        .remove(id)
        .ok_or_else(|| eyre!("Entity {} is not part of {:?}", id, project))?;
    store.save_codex(&codex).await?;
    info!("Removed {} {:?}", entity.kind, entity.name);
    Ok(())
}

/// The codex entities mentioned in a document, one per line
#[instrument(skip(folder))]
pub async fn codex_scan(folder: &Folder, project: &str, doc: DocumentId) -> Result<String> {
    let store = open_store(folder, project)?;
    let manifest = store.project().await.wrap_err("Could not read project")?;
    if manifest.get(doc).is_none() {
        return Err(eyre!("Document {} is not part of {:?}", doc, project));
    }
    let codex = store.codex().await.wrap_err("Could not read codex")?;
    let text = store.plain_text(doc).await?;
    Ok(entity_lines(codex.scan(&text)))
}
