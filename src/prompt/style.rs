//! Checkpoint-specific prompt style presets.
//!
//! Each preset bundles a style header, a negative prompt and the sampler
//! settings its model card recommends. The active preset is always passed
//! explicitly; there is no global "current style".
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Style {
    /// Juggernaut XL, natural language.
    #[default]
    Juggernaut,
    /// Animagine XL 3.x, short comma-separated tags.
    Animagine,
    /// Pony Diffusion v6 XL, score tags.
    Pony,
    /// ProtoVision XL.
    Protovision,
    /// SDXL 1.0 base.
    Sdxl,
    /// Copax Timeless.
    Copax,
}

/// How a preset wants its subject described.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Phrasing {
    Natural,
    Tags,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SamplerSettings {
    pub sampler_name: String,
    pub scheduler: String,
    pub steps: i64,
    pub cfg: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct PresetInfo {
    pub name: &'static str,
    pub header: &'static str,
    pub negative: &'static str,
    pub phrasing: Phrasing,
    pub sampler: SamplerSettings,
}

const JUGGERNAUT_HEADER: &str = "Zelos V2 cyberpunk comic style, bold lineart, consistent line \
weight, cel shading with hard shadows, high contrast palette, neon cyan and magenta accents, \
dramatic lighting, clean edges, game asset, centered, isolated subject, transparent background";
const JUGGERNAUT_NEGATIVE: &str = "photorealistic, realistic skin, 3d render, pixel art, lowres, \
blurry, noisy, grainy, jpeg artifacts, watermark, logo, signature, text, typography, background \
scene, clutter, messy lineart, sketch, deformed, bad anatomy, extra limbs, face, eyes, mouth, \
character, mascot, animal";

const ANIMAGINE_HEADER: &str = "rating: general, masterpiece, best quality, newest, cyberpunk, \
comic style, bold lineart, cel shading, high contrast, neon cyan, neon magenta, game asset, \
centered, isolated, simple background, white background";
const ANIMAGINE_NEGATIVE: &str = "nsfw, lowres, bad anatomy, bad hands, text, error, missing \
fingers, extra digit, fewer digits, cropped, worst quality, low quality, normal quality, jpeg \
artifacts, signature, watermark, username, blurry, artist name, background scene, scenery, \
detailed background, clutter";

const PONY_HEADER: &str = "score_9, score_8_up, score_7_up, score_6_up, score_5_up, score_4_up, \
rating_safe, cyberpunk, comic style, bold lineart, cel shading, high contrast, neon colors, game \
asset, centered, isolated subject, simple white background";
const PONY_NEGATIVE: &str = "nsfw, signature, watermark, logo, text, username, url, background \
scene, scenery, clutter";

const PROTOVISION_HEADER: &str = "Zelos V2, cyberpunk comic illustration, bold lineart, clean \
edges, sharp focus, cel shading with hard shadows, dramatic lighting, high contrast, neon cyan and \
magenta accents, game asset, centered, isolated, plain white background";
const PROTOVISION_NEGATIVE: &str = "lowres, blurry, soft focus, out of focus, noisy, grainy, jpeg \
artifacts, watermark, logo, signature, text, background scene, scenery, detailed background, \
clutter, messy lineart, sketch, deformed, bad anatomy, extra limbs";

const SDXL_HEADER: &str = "Zelos V2 game asset, cyberpunk comic illustration, bold outlines, cel \
shading with hard shadows, high contrast palette with neon cyan and magenta accents, centered \
composition, isolated subject, solid plain white background, dramatic lighting, high quality";
const SDXL_NEGATIVE: &str = "lowres, blurry, noisy, grainy, jpeg artifacts, watermark, signature, \
text, background scenery, cluttered background, deformed, bad anatomy";

const COPAX_HEADER: &str = "Zelos V2, cyberpunk comic illustration, bold lineart, crisp edges, \
dynamic shapes, cel shading, high contrast palette, neon cyan and magenta accents, game asset, \
centered, isolated, plain white background";
const COPAX_NEGATIVE: &str = "lowres, blurry, noisy, grainy, jpeg artifacts, watermark, logo, \
signature, text, background scene, clutter, overly photorealistic, deformed, bad anatomy, extra \
limbs";

/// Checkpoint filename fragments, tried in order; first hit wins.
const CHECKPOINT_HINTS: &[(&str, Style)] = &[
    ("animagine", Style::Animagine),
    ("copax", Style::Copax),
    ("timeless", Style::Copax),
    ("pony", Style::Pony),
    ("protovision", Style::Protovision),
    ("juggernaut", Style::Juggernaut),
];

/// Checkpoints the studio offers when ComfyUI cannot be asked.
pub const KNOWN_CHECKPOINTS: &[&str] = &[
    "juggernautXL_v9.safetensors",
    "animagineXLV31_v31.safetensors",
    "ponyDiffusionV6XL_v6StartWithThisOne.safetensors",
    "protovisionXL_v60.safetensors",
    "copaxTimelessXL_v10.safetensors",
    "sd_xl_base_1.0.safetensors",
    "sd_xl_refiner_1.0.safetensors",
];

impl Style {
    pub const ALL: [Style; 6] = [
        Style::Juggernaut,
        Style::Animagine,
        Style::Pony,
        Style::Protovision,
        Style::Sdxl,
        Style::Copax,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Style::Juggernaut => "juggernaut",
            Style::Animagine => "animagine",
            Style::Pony => "pony",
            Style::Protovision => "protovision",
            Style::Sdxl => "sdxl",
            Style::Copax => "copax",
        }
    }

    pub fn from_name(name: &str) -> Option<Style> {
        Style::ALL.into_iter().find(|s| s.name() == name)
    }

    /// Pick the preset matching a checkpoint filename.
    pub fn for_checkpoint(checkpoint: &str) -> Style {
        let lower = checkpoint.to_lowercase();
        CHECKPOINT_HINTS
            .iter()
            .find(|(hint, _)| lower.contains(hint))
            .map(|(_, style)| *style)
            .or_else(|| Style::from_name(checkpoint))
            .unwrap_or_default()
    }

    pub fn header(self) -> &'static str {
        match self {
            Style::Juggernaut => JUGGERNAUT_HEADER,
            Style::Animagine => ANIMAGINE_HEADER,
            Style::Pony => PONY_HEADER,
            Style::Protovision => PROTOVISION_HEADER,
            Style::Sdxl => SDXL_HEADER,
            Style::Copax => COPAX_HEADER,
        }
    }

    pub fn negative(self) -> &'static str {
        match self {
            Style::Juggernaut => JUGGERNAUT_NEGATIVE,
            Style::Animagine => ANIMAGINE_NEGATIVE,
            Style::Pony => PONY_NEGATIVE,
            Style::Protovision => PROTOVISION_NEGATIVE,
            Style::Sdxl => SDXL_NEGATIVE,
            Style::Copax => COPAX_NEGATIVE,
        }
    }

    pub fn phrasing(self) -> Phrasing {
        match self {
            Style::Animagine | Style::Pony => Phrasing::Tags,
            _ => Phrasing::Natural,
        }
    }

    pub fn sampler(self) -> SamplerSettings {
        let (sampler_name, scheduler, steps, cfg) = match self {
            Style::Juggernaut => ("euler", "karras", 28, 7.0),
            Style::Animagine => ("euler_ancestral", "normal", 28, 6.0),
            Style::Pony => ("euler_ancestral", "karras", 25, 7.0),
            Style::Protovision => ("euler", "karras", 28, 6.0),
            Style::Sdxl => ("euler", "normal", 28, 7.0),
            Style::Copax => ("dpmpp_3m_sde", "exponential", 35, 6.0),
        };
        SamplerSettings {
            sampler_name: sampler_name.to_string(),
            scheduler: scheduler.to_string(),
            steps,
            cfg,
        }
    }

    pub fn info(self) -> PresetInfo {
        PresetInfo {
            name: self.name(),
            header: self.header(),
            negative: self.negative(),
            phrasing: self.phrasing(),
            sampler: self.sampler(),
        }
    }
}

pub fn all_presets() -> Vec<PresetInfo> {
    Style::ALL.into_iter().map(Style::info).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checkpoint_hints_resolve_in_order() {
        assert_eq!(Style::for_checkpoint("animagineXLV31_v31.safetensors"), Style::Animagine);
        assert_eq!(Style::for_checkpoint("copaxTimelessXL_v10.safetensors"), Style::Copax);
        assert_eq!(Style::for_checkpoint("SomethingTIMELESS.ckpt"), Style::Copax);
        assert_eq!(Style::for_checkpoint("ponyDiffusionV6XL.safetensors"), Style::Pony);
        assert_eq!(Style::for_checkpoint("ProtoVisionXL_v60.safetensors"), Style::Protovision);
        assert_eq!(Style::for_checkpoint("juggernautXL_v9.safetensors"), Style::Juggernaut);
    }

    #[test]
    fn exact_name_then_default() {
        assert_eq!(Style::for_checkpoint("sdxl"), Style::Sdxl);
        assert_eq!(Style::for_checkpoint("sd_xl_base_1.0.safetensors"), Style::Juggernaut);
        assert_eq!(Style::for_checkpoint(""), Style::Juggernaut);
    }

    #[test]
    fn tag_presets_are_animagine_and_pony() {
        let tags: Vec<_> =
            Style::ALL.into_iter().filter(|s| s.phrasing() == Phrasing::Tags).collect();
        assert_eq!(tags, vec![Style::Animagine, Style::Pony]);
    }

    #[test]
    fn names_round_trip() {
        for style in Style::ALL {
            assert_eq!(Style::from_name(style.name()), Some(style));
        }
        assert_eq!(all_presets().len(), 6);
        assert_eq!(Style::Copax.sampler().scheduler, "exponential");
    }
}
