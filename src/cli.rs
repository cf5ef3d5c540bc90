//! Command line for inspecting, checking and repairing scene files.

use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use std::fmt::Write as _;
use std::path::PathBuf;

use crate::entities::{CollectionFlags, CollectionId, Main};

// Build version with target info
const VERSION_INFO: &str = const_format::concatcp!(
    env!("CARGO_PKG_VERSION"), "\n",
    "Format: collgraph JSON\n",
    "Target: ", std::env::consts::ARCH, "-", std::env::consts::OS
);

/// Collection hierarchy inspector
#[derive(Parser, Debug)]
#[command(author, version = VERSION_INFO, about, long_about = None)]
pub struct Args {
    /// Scene file to load (JSON)
    #[arg(value_name = "FILE")]
    pub file_path: PathBuf,

    #[command(subcommand)]
    pub command: Option<Command>,

    /// Enable debug logging to file (default: collgraph.log)
    #[arg(short = 'l', long = "log", value_name = "LOG_FILE")]
    pub log_file: Option<Option<PathBuf>>,

    /// Increase logging verbosity (default: warn, -v: info, -vv: debug, -vvv+: trace)
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count)]
    pub verbosity: u8,

    /// Custom configuration directory (overrides default platform paths)
    #[arg(short = 'c', long = "config-dir", value_name = "DIR")]
    pub config_dir: Option<PathBuf>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Print the collection tree of every scene (default)
    Tree,
    /// Validate links, membership and cycles; exits non-zero on problems
    Check,
    /// Drop invalid entries, break cycles, rebuild parents and write the file back
    Repair {
        /// Write to this file instead of overwriting FILE
        #[arg(short = 'o', long = "output", value_name = "OUT")]
        output: Option<PathBuf>,
    },
    /// List the objects under a collection (scene roots when omitted)
    Objects {
        /// Collection name
        #[arg(value_name = "COLLECTION")]
        collection: Option<String>,
        /// Also list objects reached through instancers
        #[arg(short = 'i', long = "instanced")]
        instanced: bool,
    },
}

/// Indented tree of every scene, then of collections no scene reaches.
pub fn format_tree(main: &Main) -> String {
    let mut out = String::new();
    for scene in main.scenes() {
        let _ = writeln!(out, "{}", scene.name);
        let mut stack = vec![(scene.master_collection, 1usize)];
        let mut path = Vec::new();
        tree_lines(main, &mut stack, &mut path, &mut out);
    }
    let loose: Vec<CollectionId> = main
        .collections()
        .filter(|c| c.parents().is_empty() && !main.is_in_scene(c.id))
        .map(|c| c.id)
        .collect();
    if !loose.is_empty() {
        out.push_str("(not in any scene)\n");
        for id in loose {
            let mut stack = vec![(id, 1usize)];
            let mut path = Vec::new();
            tree_lines(main, &mut stack, &mut path, &mut out);
        }
    }
    out
}

fn tree_lines(main: &Main, stack: &mut Vec<(CollectionId, usize)>, path: &mut Vec<CollectionId>, out: &mut String) {
    while let Some((id, depth)) = stack.pop() {
        path.truncate(depth - 1);
        let Some(coll) = main.collection(id) else {
            continue;
        };
        let mut marks = String::new();
        if coll.flags.contains(CollectionFlags::HIDE_VIEWPORT) {
            marks.push_str(" [hidden]");
        }
        if coll.flags.contains(CollectionFlags::HIDE_RENDER) {
            marks.push_str(" [no render]");
        }
        if !coll.is_editable() {
            marks.push_str(" [linked]");
        }
        let looped = path.contains(&id);
        let _ = writeln!(
            out,
            "{}{} ({} objects){}{}",
            "  ".repeat(depth),
            main.ui_name(id),
            coll.members().len(),
            marks,
            if looped { " [cycle]" } else { "" }
        );
        if looped {
            continue;
        }
        path.push(id);
        let children: Vec<CollectionId> = coll.child_ids().collect();
        stack.extend(children.into_iter().rev().map(|c| (c, depth + 1)));
    }
}

/// Problems found in the hierarchy; empty when healthy.
pub fn check(main: &mut Main) -> Vec<String> {
    let mut problems = Vec::new();
    for id in main.all_collection_ids() {
        let name = main.ui_name(id).to_string();
        if !main.collection_validate(id) {
            problems.push(format!("'{name}': repeated links or nesting cycle"));
        }
        main.membership_ensure(id);
        let Some(coll) = main.collection(id) else {
            continue;
        };
        if coll.membership_state() != crate::entities::MembershipState::Clean {
            problems.push(format!("'{name}': null or duplicate member entries"));
        }
        let objects: Vec<_> = coll.objects().collect();
        for ob in objects {
            if main.creates_instancing_cycle(ob, id) {
                let ob_name = main.object(ob).map(|o| o.name.clone()).unwrap_or_default();
                problems.push(format!("'{name}': object '{ob_name}' instances its own hierarchy"));
            }
        }
    }
    problems
}

/// Converge everything `check` reports. Returns whether anything changed.
pub fn repair(main: &mut Main) -> bool {
    let mut changed = main.remove_invalid_entries();
    for id in main.all_collection_ids() {
        changed |= main.fix_cycles(id);
    }
    main.rebuild_all_parent_relations();
    changed
}

/// Object names under `collection` (or under every scene root), recursively.
pub fn list_objects(main: &Main, collection: Option<&str>, instanced: bool) -> Result<Vec<String>> {
    let roots: Vec<CollectionId> = match collection {
        Some(name) => vec![main
            .find_collection_by_name(name)
            .ok_or_else(|| anyhow!("No collection named '{name}'"))?],
        None => main.scenes().map(|s| s.master_collection).collect(),
    };
    let mut names = Vec::new();
    for root in roots {
        let bases = if instanced { main.object_cache_instanced(root) } else { main.object_cache(root) };
        names.extend(bases.iter().filter_map(|b| main.object(b.object)).map(|o| o.name.clone()));
    }
    Ok(names)
}
