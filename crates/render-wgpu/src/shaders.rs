//! WGSL source inspection: which parameter slots a program declares and
//! which techniques its fragment entry points spell out.

use rasterscene_render::{SlotKind, slots};

/// A parameter slot and the WGSL identifier that declares it.
pub(crate) struct SlotBinding {
    pub name: &'static str,
    pub kind: SlotKind,
    pub ident: &'static str,
}

/// Every slot a program can expose. A `SlotId` is an index into this table.
pub(crate) const SLOT_TABLE: [SlotBinding; 8] = [
    SlotBinding {
        name: slots::WORLD,
        kind: SlotKind::Matrix,
        ident: "world",
    },
    SlotBinding {
        name: slots::WORLD_VIEW_PROJ,
        kind: SlotKind::Matrix,
        ident: "world_view_proj",
    },
    SlotBinding {
        name: slots::VIEW_INVERSE,
        kind: SlotKind::Matrix,
        ident: "view_inverse",
    },
    SlotBinding {
        name: slots::DIFFUSE_MAP,
        kind: SlotKind::Texture,
        ident: "diffuse_map",
    },
    SlotBinding {
        name: slots::NORMAL_MAP,
        kind: SlotKind::Texture,
        ident: "normal_map",
    },
    SlotBinding {
        name: slots::SPECULAR_MAP,
        kind: SlotKind::Texture,
        ident: "specular_map",
    },
    SlotBinding {
        name: slots::GLOSSINESS_MAP,
        kind: SlotKind::Texture,
        ident: "glossiness_map",
    },
    SlotBinding {
        name: slots::SAMPLER,
        kind: SlotKind::Sampler,
        ident: "sampler_state",
    },
];

/// Table index of the first texture slot; textures occupy bindings 1..=4.
pub(crate) const FIRST_TEXTURE_SLOT: usize = 3;
pub(crate) const TEXTURE_SLOTS: usize = 4;

pub(crate) const WORLD_SLOT: usize = 0;
pub(crate) const WORLD_VIEW_PROJ_SLOT: usize = 1;
pub(crate) const VIEW_INVERSE_SLOT: usize = 2;

/// One technique: its name and the fragment entry point of each pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct TechniqueEntries {
    pub name: String,
    pub passes: Vec<String>,
}

/// `source` with `//` comments removed.
pub(crate) fn strip_comments(source: &str) -> String {
    source
        .lines()
        .map(|line| line.split("//").next().unwrap_or(""))
        .collect::<Vec<_>>()
        .join("\n")
}

fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

/// Whether `ident` occurs in `source` as a whole identifier.
pub(crate) fn contains_identifier(source: &str, ident: &str) -> bool {
    source.match_indices(ident).any(|(start, _)| {
        let before = source[..start].chars().next_back();
        let after = source[start + ident.len()..].chars().next();
        !before.is_some_and(is_ident_char) && !after.is_some_and(is_ident_char)
    })
}

/// Slot table indices declared by `source`.
pub(crate) fn declared_slots(source: &str) -> Vec<bool> {
    SLOT_TABLE
        .iter()
        .map(|binding| contains_identifier(source, binding.ident))
        .collect()
}

/// Names of the functions tagged with `attribute` (e.g. `@fragment`), in
/// source order.
pub(crate) fn entry_points(source: &str, attribute: &str) -> Vec<String> {
    let mut names = Vec::new();
    for (start, _) in source.match_indices(attribute) {
        let rest = &source[start + attribute.len()..];
        let Some(fn_at) = rest.find("fn ") else {
            continue;
        };
        let name: String = rest[fn_at + 3..]
            .trim_start()
            .chars()
            .take_while(|c| is_ident_char(*c))
            .collect();
        if !name.is_empty() {
            names.push(name);
        }
    }
    names
}

/// Group fragment entry points named `fs_<technique>` or
/// `fs_<technique>_pass<N>` into techniques, ordered by first appearance.
/// Passes run in ascending `N`; a bare `fs_<technique>` is pass 0.
pub(crate) fn discover_techniques(source: &str) -> Vec<TechniqueEntries> {
    let mut found: Vec<(String, Vec<(u32, String)>)> = Vec::new();
    for entry in entry_points(source, "@fragment") {
        let Some(rest) = entry.strip_prefix("fs_") else {
            continue;
        };
        let (name, pass) = match rest.rsplit_once("_pass") {
            Some((name, n)) => match n.parse::<u32>() {
                Ok(n) => (name, n),
                Err(_) => (rest, 0),
            },
            None => (rest, 0),
        };
        if name.is_empty() {
            continue;
        }
        match found.iter_mut().find(|(n, _)| n == name) {
            Some((_, passes)) => passes.push((pass, entry.clone())),
            None => found.push((name.to_string(), vec![(pass, entry.clone())])),
        }
    }

    found
        .into_iter()
        .map(|(name, mut passes)| {
            passes.sort_by_key(|(n, _)| *n);
            TechniqueEntries {
                name,
                passes: passes.into_iter().map(|(_, entry)| entry).collect(),
            }
        })
        .collect()
}
