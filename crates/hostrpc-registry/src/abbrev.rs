//! Shortened node names.
//!
//! Each rule rewrites the first match in a name segment; rules run in order,
//! so later rules see the output of earlier ones. The result always starts
//! lowercase.

use std::sync::LazyLock;

use regex::Regex;

const RULES: &[(&str, &str)] = &[
    ("isMasterTrackContentShownOnTrackGroups", "showGroupMasterContent"),
    ("isRemoteControlsSectionVisible", "showRemoteControls"),
    ("([Cc])ursorRemoteControlsPage", "${1}ontrolsPage"),
    ("hasAudioInputSelected", "audioInSelected"),
    ("hasNoteInputSelected", "noteInSelected"),
    ("^(.+)InsertionPoint", "${1}"),
    ("canHoldAudioData", "canHoldAudio"),
    ("canHoldNoteData", "canHoldNote"),
    ("queuedForStop", "stopQueued"),
    ("([Aa]ct)ive", "${1}"),
    ("([Tt])ransport", "${1}p"),
    ("^(.+)OfBank", "${1}"),
    ("EffectTrack", "FxTrack"),
    ("effectTrack", "fxTrack"),
    ("([Mm])aster", "${1}st"),
    ("getItemAt", "at"),
    ("getParameter", "at"),
    (r"^setIs(\p{Lu}.+)", "${1}"),
    (r"^is(\p{Lu}.+)", "${1}"),
    (r"^get(\p{Lu}.+)", "${1}"),
    (r"^set(\p{Lu}.+)", "${1}"),
    ("([Mm]od)ulated", "${1}"),
    ("([Dd]isp)layed", "${1}"),
    ("([Vv]al)ue", "${1}"),
    ("([Cc]lip)LauncherSlot", "${1}"),
    ("([Cc]lip)Launcher", "${1}"),
    ("([Vv]ol)ume", "${1}"),
    ("([Aa]cc)ent", "${1}"),
    ("Cross[fF]ade", "Xfade"),
    ("cross[fF]ade", "xfade"),
    ("([Cc]h)annel", "${1}"),
    ("([Gg]r)oup", "${1}"),
    ("([Tt]r)ack", "${1}"),
    ("([Dd]ev)ice", "${1}"),
    ("([Cc]ur)sor", "${1}"),
    ("(.+)Bank", "${1}s"),
    ("([Ff])orwards", "${1}wd"),
    ("([Bb]ack)wards", "${1}"),
    ("([Pp]os)ition", "${1}"),
    ("([Ss])ource", "${1}rc"),
    ("([Ss]el)ector", "${1}"),
    ("([Aa]rr)anger", "${1}"),
    ("([Aa]rr)angement", "${1}"),
    ("([Cc])ontrol", "${1}trl"),
    ("([Aa])mount", "${1}mt"),
    ("([Cc])ount", "${1}t"),
    ("([Rr]ec)ording", "${1}"),
    ("([Rr]ec)ord", "${1}"),
    ("([Aa]pp)lication", "${1}"),
    ("([Ii]ns)ertion", "${1}"),
    ("([Ii]ns)ert", "${1}"),
    ("([Mm]et)ronome", "${1}"),
    ("([Rr]em)ote", "${1}"),
];

static COMPILED: LazyLock<Vec<(Regex, &'static str)>> = LazyLock::new(|| {
    RULES
        .iter()
        .map(|(pattern, replacement)| (Regex::new(pattern).unwrap(), *replacement))
        .collect()
});

/// Shorten one name segment.
pub fn abbreviate(name: &str) -> String {
    let mut out = name.to_owned();
    for (pattern, replacement) in COMPILED.iter() {
        out = pattern.replacen(&out, 1, *replacement).into_owned();
    }
    let mut chars = out.chars();
    match chars.next() {
        Some(first) if first.is_uppercase() => first.to_lowercase().chain(chars).collect(),
        _ => out,
    }
}

/// Node name as published, abbreviated when `enabled`.
pub(crate) fn segment(name: &str, enabled: bool) -> String {
    if enabled {
        abbreviate(name)
    } else {
        name.to_owned()
    }
}
