//! Structural path classifier: asset relative path -> prompt pair.
//!
//! Rules are tried in a fixed order and the first anchored full match wins.
//! Each rule describes its subject once; the active style decides whether the
//! description is rendered as a sentence or as a tag list.
use regex::Regex;
use serde::Serialize;
use std::sync::LazyLock;

use crate::prompt::style::{Phrasing, Style};

const VIEW: &str = "(front|side|three-quarter)";
const SLUG: &str = "([a-z0-9-]+)";
const OUTFIT: &str = "(outfit-[a-z0-9-]+)";
const FRAME_SIZE: u32 = 256;
const IDLE_FRAMES: u32 = 8;
const FLY_FRAMES: u32 = 6;

const OUTFIT_DESCRIPTIONS: &[(&str, &str)] = &[
    ("outfit-default-suit", "space suit overlay with cyan trim"),
    ("outfit-pirate", "tricorn hat, eye patch, small cape"),
    ("outfit-wizard", "starry hat, glowing cyan wand"),
    ("outfit-detective", "deerstalker hat, magnifying glass"),
    ("outfit-chef", "chef hat, apron, glowing spatula"),
    ("outfit-superhero", "cape, small mask"),
    ("outfit-scientist", "lab goggles, glowing beaker"),
    ("outfit-musician", "neon headphones, small synth"),
    ("outfit-explorer", "safari hat, binoculars"),
    ("outfit-ninja", "headband, throwing star"),
    ("outfit-royal", "crown, royal cape"),
];

const PLANET_TEXTURE_DESCRIPTIONS: &[(&str, &str)] = &[
    ("solid", "simple smooth spherical planet, single base color with subtle shading"),
    ("gradient", "smooth spherical planet with a clean two-tone gradient band"),
    ("marble", "spherical planet with gentle marbling swirls, low-frequency pattern"),
    ("rocky", "spherical rocky planet with a few crater hints, simple surface noise"),
    ("gas-giant", "large spherical gas giant with soft horizontal bands"),
    ("ice", "icy spherical planet with pale blue tones and a few soft cracks"),
    ("lava", "lava spherical planet with glowing lava rivers and dark cooled crust"),
    ("ocean", "ocean spherical planet with a few simple continent shapes and a glossy highlight"),
    ("forest", "forest spherical planet with simple green land masses and subtle variation"),
    ("tech", "tech spherical planet with a few geometric panel lines and tiny glow accents"),
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PromptPair {
    pub positive: String,
    pub negative: String,
}

/// What a rule knows about the asset, in both surface forms.
struct Subject {
    sentence: String,
    tags: Vec<String>,
}

impl Subject {
    fn new<const N: usize>(sentence: String, tags: [&str; N]) -> Self {
        Subject { sentence, tags: tags.iter().map(|t| t.to_string()).collect() }
    }
}

enum Matcher {
    Literal(&'static str),
    Shape(Regex),
}

impl Matcher {
    fn shape(pattern: &str) -> Self {
        let anchored = format!("^(?:{})$", pattern);
        Matcher::Shape(Regex::new(&anchored).expect("classifier rule regex is valid"))
    }

    /// Captured fields on a full match.
    fn fields<'p>(&self, rel_path: &'p str) -> Option<Vec<&'p str>> {
        match self {
            Matcher::Literal(literal) => (rel_path == *literal).then(Vec::new),
            Matcher::Shape(re) => {
                let caps = re.captures(rel_path)?;
                Some(caps.iter().skip(1).map(|m| m.map_or("", |m| m.as_str())).collect())
            }
        }
    }
}

struct Rule {
    name: &'static str,
    matcher: Matcher,
    describe: fn(&[&str]) -> Subject,
}

fn rule(name: &'static str, matcher: Matcher, describe: fn(&[&str]) -> Subject) -> Rule {
    Rule { name, matcher, describe }
}

pub struct PathClassifier {
    rules: Vec<Rule>,
}

static DEFAULT_CLASSIFIER: LazyLock<PathClassifier> = LazyLock::new(PathClassifier::new);

/// Classify with the built-in rule set.
pub fn classify(rel_path: &str, style: Style) -> Option<PromptPair> {
    DEFAULT_CLASSIFIER.classify(rel_path, style)
}

impl PathClassifier {
    pub fn new() -> Self {
        let rules = vec![
            rule(
                "base-view",
                Matcher::shape(&format!(r"sprites/astro-duck/base/astro-duck-base-{VIEW}\.png")),
                base_view,
            ),
            rule(
                "base-idle-sheet",
                Matcher::Literal("sprites/astro-duck/base/astro-duck-base-idle-sheet.png"),
                base_idle_sheet,
            ),
            rule(
                "base-fly-sheet",
                Matcher::Literal("sprites/astro-duck/base/astro-duck-base-fly-sheet.png"),
                base_fly_sheet,
            ),
            rule(
                "expression",
                Matcher::shape(&format!(
                    r"sprites/astro-duck/expressions/astro-duck-{SLUG}-{VIEW}\.png"
                )),
                expression,
            ),
            rule(
                "outfit-view",
                Matcher::shape(&format!(r"sprites/astro-duck/outfits/{OUTFIT}-{VIEW}\.png")),
                outfit_view,
            ),
            rule(
                "outfit-idle-sheet",
                Matcher::shape(&format!(r"sprites/astro-duck/outfits/{OUTFIT}-idle-sheet\.png")),
                outfit_idle_sheet,
            ),
            rule(
                "outfit-fly-sheet",
                Matcher::shape(&format!(r"sprites/astro-duck/outfits/{OUTFIT}-fly-sheet\.png")),
                outfit_fly_sheet,
            ),
            rule(
                "planet-texture",
                Matcher::shape(&format!(r"sprites/planets/texture-{SLUG}\.png")),
                planet_texture,
            ),
            rule(
                "planet-ring",
                Matcher::shape(&format!(r"sprites/planets/ring-{SLUG}\.png")),
                planet_ring,
            ),
            rule(
                "planet-atmosphere",
                Matcher::shape(&format!(r"sprites/planets/atmosphere-{SLUG}\.png")),
                planet_atmosphere,
            ),
            rule(
                "planet-state",
                Matcher::shape(&format!(r"sprites/planets/state-{SLUG}\.png")),
                planet_state,
            ),
            rule(
                "satellite-icon",
                Matcher::shape(&format!(r"sprites/satellites/satellite-{SLUG}\.png")),
                satellite_icon,
            ),
            rule(
                "satellite-state",
                Matcher::shape(&format!(r"sprites/satellites/state-{SLUG}\.png")),
                satellite_state,
            ),
            rule(
                "satellite-glow",
                Matcher::shape(&format!(r"sprites/satellites/glow-{SLUG}\.png")),
                satellite_glow,
            ),
            rule(
                "satellite-badge",
                Matcher::shape(&format!(r"sprites/satellites/badge-{SLUG}\.png")),
                satellite_badge,
            ),
        ];
        PathClassifier { rules }
    }

    /// Name of the first rule matching `rel_path`.
    pub fn matching_rule(&self, rel_path: &str) -> Option<&'static str> {
        self.rules.iter().find(|r| r.matcher.fields(rel_path).is_some()).map(|r| r.name)
    }

    /// Build the prompt pair for `rel_path`, or `None` when no rule applies.
    pub fn classify(&self, rel_path: &str, style: Style) -> Option<PromptPair> {
        let (rule, fields) = self
            .rules
            .iter()
            .find_map(|r| r.matcher.fields(rel_path).map(|fields| (r, fields)))?;
        let subject = (rule.describe)(&fields);
        let positive = match style.phrasing() {
            Phrasing::Natural => format!("{}. {}", style.header(), subject.sentence),
            Phrasing::Tags => {
                let tags = subject.tags.iter().map(String::as_str);
                join_tags(std::iter::once(style.header()).chain(tags))
            }
        };
        Some(PromptPair { positive, negative: style.negative().to_string() })
    }
}

impl Default for PathClassifier {
    fn default() -> Self {
        Self::new()
    }
}

fn join_tags<'a>(tags: impl Iterator<Item = &'a str>) -> String {
    tags.map(str::trim).filter(|t| !t.is_empty()).collect::<Vec<_>>().join(", ")
}

fn lookup<'a>(table: &[(&str, &'a str)], key: &'a str) -> &'a str {
    table.iter().find(|(k, _)| *k == key).map(|(_, v)| *v).unwrap_or(key)
}

fn base_view(f: &[&str]) -> Subject {
    let view = format!("{} view", f[0]);
    Subject::new(
        format!(
            "Astronaut duck mascot wearing a minimal undersuit (no outer suit), sleek proportions, \
             smooth simple materials, bubble helmet optional and transparent, full body, {view}"
        ),
        [
            "1animal",
            "duck",
            "astronaut",
            "mascot",
            "original character",
            "full body",
            &view,
            "minimal undersuit",
            "no outer suit",
        ],
    )
}

fn base_sheet(frames: u32, motion: &str, tags_motion: [&str; 2]) -> Subject {
    let frames_tag = format!("{frames} frames");
    let frame_tag = format!("each frame {FRAME_SIZE}x{FRAME_SIZE}");
    Subject::new(
        format!(
            "{frames}-frame horizontal sprite sheet, astronaut duck in minimal undersuit, \
             {motion}, each frame {FRAME_SIZE}x{FRAME_SIZE}, total size {}x{FRAME_SIZE}, \
             consistent spacing, aligned frames",
            frames * FRAME_SIZE
        ),
        [
            "sprite sheet",
            &frames_tag,
            "horizontal",
            "duck",
            "astronaut",
            tags_motion[0],
            tags_motion[1],
            &frame_tag,
            "aligned frames",
            "consistent spacing",
        ],
    )
}

fn base_idle_sheet(_: &[&str]) -> Subject {
    base_sheet(IDLE_FRAMES, "floating idle animation", ["idle animation", "floating"])
}

fn base_fly_sheet(_: &[&str]) -> Subject {
    base_sheet(FLY_FRAMES, "jetpack flying animation", ["flying animation", "jetpack"])
}

fn expression(f: &[&str]) -> Subject {
    let expression = format!("{} expression", f[0]);
    let view = format!("{} view", f[1]);
    Subject::new(
        format!(
            "Astro-Duck face overlay only (no body), {expression}, \
             matches base head shape and eye placement, aligned to base face, {view}"
        ),
        [
            "duck",
            "astronaut",
            "mascot",
            "face only",
            "overlay",
            "no body",
            &expression,
            &view,
            "aligned",
        ],
    )
}

fn outfit_view(f: &[&str]) -> Subject {
    let desc = lookup(OUTFIT_DESCRIPTIONS, f[0]);
    let view = format!("{} view", f[1]);
    Subject::new(
        format!(
            "Astro-Duck outfit overlay only (costume pieces only), {desc}, \
             do not redraw body or head, aligned to base undersuit silhouette, {view}"
        ),
        [
            "duck",
            "astronaut",
            "outfit overlay",
            "costume pieces only",
            "no body",
            "no head redraw",
            desc,
            &view,
            "aligned",
        ],
    )
}

fn outfit_sheet(
    outfit: &str,
    frames: u32,
    motion: &str,
    base: &str,
    tags_motion: &[&str],
) -> Subject {
    let desc = lookup(OUTFIT_DESCRIPTIONS, outfit);
    let frames_tag = format!("{frames} frames");
    let frame_tag = format!("each frame {FRAME_SIZE}x{FRAME_SIZE}");
    let mut subject = Subject::new(
        format!(
            "{frames}-frame horizontal sprite sheet, \
             Astro-Duck outfit overlay only (no body), {desc}, \
             {motion} overlay aligned to base {base} sheet, each frame {FRAME_SIZE}x{FRAME_SIZE}, \
             total size {}x{FRAME_SIZE}, aligned frames",
            frames * FRAME_SIZE
        ),
        [
            "sprite sheet",
            &frames_tag,
            "horizontal",
            "outfit overlay",
            "costume pieces only",
            "no body",
            desc,
        ],
    );
    subject.tags.extend(tags_motion.iter().map(|t| t.to_string()));
    subject.tags.extend(["aligned frames".to_string(), frame_tag]);
    subject
}

fn outfit_idle_sheet(f: &[&str]) -> Subject {
    outfit_sheet(f[0], IDLE_FRAMES, "idle animation", "idle", &["idle animation"])
}

fn outfit_fly_sheet(f: &[&str]) -> Subject {
    outfit_sheet(f[0], FLY_FRAMES, "fly animation", "fly", &["flying animation", "jetpack"])
}

fn planet_texture(f: &[&str]) -> Subject {
    let texture = f[0];
    let texture_tag = texture.replace('-', " ");
    Subject::new(
        format!(
            "Stylized spherical planet icon, {}, perfect round silhouette, \
             3D shading with a clear terminator shadow, small specular highlight, \
             no rings, no face, no characters, centered, isolated",
            lookup(PLANET_TEXTURE_DESCRIPTIONS, texture)
        ),
        [
            "planet",
            "spherical",
            &texture_tag,
            "clean silhouette",
            "terminator shadow",
            "specular highlight",
            "no rings",
            "no face",
        ],
    )
}

fn planet_ring(f: &[&str]) -> Subject {
    Subject::new(
        format!(
            "Saturn-like rings overlay only ({}), semi-transparent, subtle gradient, \
             no planet body, centered",
            f[0]
        ),
        ["saturn rings", "overlay", "semi-transparent", f[0], "no planet"],
    )
}

fn planet_atmosphere(f: &[&str]) -> Subject {
    let thickness = format!("{} thickness", f[0]);
    Subject::new(
        format!(
            "Atmosphere halo overlay only, soft gradient ring, {thickness}, \
             no planet body, centered"
        ),
        ["atmosphere halo", "overlay", "soft gradient", &thickness, "no planet"],
    )
}

fn planet_state(f: &[&str]) -> Subject {
    Subject::new(
        format!(
            "Planet state overlay only ({}), neon accent ring/glow, no planet body, centered",
            f[0]
        ),
        ["planet state", "overlay", f[0], "neon glow", "ring", "no planet"],
    )
}

fn satellite_icon(f: &[&str]) -> Subject {
    Subject::new(
        format!(
            "Satellite UI icon ({}), clean readable silhouette, minimal shading, neon cyan accent",
            f[0]
        ),
        [
            "game UI icon",
            "satellite icon",
            f[0],
            "simple shapes",
            "readable silhouette",
            "minimal shading",
        ],
    )
}

fn satellite_state(f: &[&str]) -> Subject {
    Subject::new(
        format!("Satellite state overlay ring/glow ({}), centered", f[0]),
        ["satellite state", "overlay", f[0], "ring", "glow"],
    )
}

fn satellite_glow(f: &[&str]) -> Subject {
    Subject::new(
        format!("Soft neon halo ring overlay ({}), centered", f[0]),
        ["neon halo", "overlay", f[0], "ring"],
    )
}

fn satellite_badge(f: &[&str]) -> Subject {
    Subject::new(
        format!(
            "Satellite badge overlay ({}), small badge anchored to lower-right corner, \
             centered canvas",
            f[0]
        ),
        ["badge", "overlay", f[0], "small", "corner"],
    )
}
