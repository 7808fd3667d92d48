//! Rewrites the inputs of a workflow for one asset.
//!
//! Nodes are recognized by the shape of their inputs rather than by fixed
//! ids, so any API-format export with the usual node types works.
use serde_json::{json, Value};

use crate::prompt::{PromptPair, SamplerSettings};
use crate::workflow::document::JobDocument;

const CHECKPOINT_KEYS: &[&str] = &["ckpt_name", "checkpoint", "model_name"];
const VAE_LOADERS: &[&str] = &["VAELoader", "VAELoaderSimple"];
const VAE_DECODE: &str = "VAEDecode";

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SamplerOverrides {
    pub sampler_name: Option<String>,
    pub scheduler: Option<String>,
    pub steps: Option<i64>,
    pub cfg: Option<f64>,
}

impl SamplerOverrides {
    pub fn is_empty(&self) -> bool {
        self.sampler_name.is_none()
            && self.scheduler.is_none()
            && self.steps.is_none()
            && self.cfg.is_none()
    }
}

impl From<SamplerSettings> for SamplerOverrides {
    fn from(s: SamplerSettings) -> Self {
        SamplerOverrides {
            sampler_name: Some(s.sampler_name),
            scheduler: Some(s.scheduler),
            steps: Some(s.steps),
            cfg: Some(s.cfg),
        }
    }
}

/// Everything one job needs written into the base workflow.
#[derive(Debug, Clone)]
pub struct MutationTarget {
    pub positive: String,
    pub negative: String,
    pub width: u32,
    pub height: u32,
    pub seed: Option<i64>,
    pub checkpoint: Option<String>,
    pub vae: Option<String>,
    pub filename_prefix: Option<String>,
    pub sampler: SamplerOverrides,
}

impl MutationTarget {
    pub fn new(prompts: &PromptPair, width: u32, height: u32) -> Self {
        MutationTarget {
            positive: prompts.positive.clone(),
            negative: prompts.negative.clone(),
            width,
            height,
            seed: None,
            checkpoint: None,
            vae: None,
            filename_prefix: None,
            sampler: SamplerOverrides::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MutationOutcome {
    /// False when a VAE was requested but the workflow has no loader for it.
    pub vae_applied: bool,
}

pub fn mutate(doc: &mut JobDocument, target: &MutationTarget) -> MutationOutcome {
    set_text_inputs(doc, &target.positive, &target.negative);
    set_size_inputs(doc, target.width, target.height);
    if let Some(seed) = target.seed {
        set_seed_inputs(doc, seed);
    }
    if let Some(ckpt) = target.checkpoint.as_deref() {
        set_checkpoint_inputs(doc, ckpt);
    }
    let vae_applied = match target.vae.as_deref() {
        Some(vae) => set_vae_inputs(doc, vae),
        None => false,
    };
    if let Some(prefix) = target.filename_prefix.as_deref() {
        set_filename_prefix_inputs(doc, prefix);
    }
    if !target.sampler.is_empty() {
        set_sampler_inputs(doc, &target.sampler);
    }
    MutationOutcome { vae_applied }
}

enum TextSlot {
    Single,
    Dual,
}

struct TextNode {
    id: String,
    slot: TextSlot,
    negative: bool,
}

fn collect_text_nodes(doc: &JobDocument) -> Vec<TextNode> {
    doc.nodes()
        .filter_map(|node| {
            let slot = if node.has_str("text") {
                TextSlot::Single
            } else if node.has_str("text_g") || node.has_str("text_l") {
                TextSlot::Dual
            } else {
                return None;
            };
            Some(TextNode {
                id: node.id.to_string(),
                slot,
                negative: node.title.to_lowercase().contains("neg"),
            })
        })
        .collect()
}

fn write_text(doc: &mut JobDocument, node: &TextNode, text: &str) {
    let Some(inputs) = doc.inputs_mut(&node.id) else {
        return;
    };
    match node.slot {
        TextSlot::Single => {
            inputs.insert("text".to_string(), json!(text));
        }
        TextSlot::Dual => {
            for key in ["text_g", "text_l"] {
                if inputs.contains_key(key) {
                    inputs.insert(key.to_string(), json!(text));
                }
            }
        }
    }
}

/// Title-driven prompt routing, falling back to document position.
pub fn set_text_inputs(doc: &mut JobDocument, positive: &str, negative: &str) {
    let nodes = collect_text_nodes(doc);
    for node in &nodes {
        write_text(doc, node, if node.negative { negative } else { positive });
    }
    if nodes.len() >= 2 && !nodes.iter().any(|n| n.negative) {
        write_text(doc, &nodes[0], positive);
        write_text(doc, &nodes[1], negative);
    }
}

pub fn set_size_inputs(doc: &mut JobDocument, width: u32, height: u32) {
    for mut node in doc.nodes_mut() {
        if node.has_int("width") && node.has_int("height") {
            node.set("width", width);
            node.set("height", height);
        }
        if node.has_int("target_width") {
            node.set("target_width", width);
        }
        if node.has_int("target_height") {
            node.set("target_height", height);
        }
        for key in ["crop_w", "crop_h"] {
            if node.has_int(key) {
                node.set(key, 0);
            }
        }
    }
}

pub fn set_seed_inputs(doc: &mut JobDocument, seed: i64) {
    for mut node in doc.nodes_mut() {
        if node.has_int("seed") {
            node.set("seed", seed);
        }
    }
}

/// Only the first checkpoint alias present on a node is replaced.
pub fn set_checkpoint_inputs(doc: &mut JobDocument, checkpoint: &str) {
    for mut node in doc.nodes_mut() {
        if let Some(key) = CHECKPOINT_KEYS.iter().find(|k| node.has_str(k)) {
            node.set(key, checkpoint);
        }
    }
}

/// Point every VAE loader at `vae` and wire decoders to the first loader.
///
/// Returns false, leaving the document untouched, when no loader exists.
pub fn set_vae_inputs(doc: &mut JobDocument, vae: &str) -> bool {
    let mut loaders = Vec::new();
    for mut node in doc.nodes_mut() {
        if VAE_LOADERS.contains(&node.class_type.as_str()) && node.has_str("vae_name") {
            node.set("vae_name", vae);
            loaders.push(node.id.to_string());
        }
    }
    let Some(loader) = loaders.first() else {
        return false;
    };
    for mut node in doc.nodes_mut() {
        if node.class_type == VAE_DECODE && node.inputs.get("vae").is_some_and(Value::is_array) {
            node.set("vae", json!([loader, 0]));
        }
    }
    true
}

pub fn set_filename_prefix_inputs(doc: &mut JobDocument, prefix: &str) {
    for mut node in doc.nodes_mut() {
        if node.has_str("filename_prefix") {
            node.set("filename_prefix", prefix);
        }
    }
}

pub fn set_sampler_inputs(doc: &mut JobDocument, overrides: &SamplerOverrides) {
    for mut node in doc.nodes_mut() {
        if !node.class_type.to_lowercase().contains("sampler") {
            continue;
        }
        if let Some(name) = overrides.sampler_name.as_deref() {
            if node.has_str("sampler_name") {
                node.set("sampler_name", name);
            }
        }
        if let Some(scheduler) = overrides.scheduler.as_deref() {
            if node.has_str("scheduler") {
                node.set("scheduler", scheduler);
            }
        }
        if let Some(steps) = overrides.steps {
            if node.has_int("steps") {
                node.set("steps", steps);
            }
        }
        if let Some(cfg) = overrides.cfg {
            if node.has_number("cfg") {
                node.set("cfg", cfg);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> JobDocument {
        JobDocument::from_value(json!({
            "4": {"class_type": "CheckpointLoaderSimple",
                  "inputs": {"ckpt_name": "old.safetensors"}},
            "5": {"class_type": "EmptyLatentImage",
                  "inputs": {"width": 1024, "height": 1024, "batch_size": 1}},
            "6": {"class_type": "CLIPTextEncode", "_meta": {"title": "Positive Prompt"},
                  "inputs": {"text": "", "clip": ["4", 1]}},
            "7": {"class_type": "CLIPTextEncode", "_meta": {"title": "Negative Prompt"},
                  "inputs": {"text": "", "clip": ["4", 1]}},
            "3": {"class_type": "KSampler", "inputs": {"seed": 1, "steps": 20, "cfg": 8.0,
                  "sampler_name": "euler", "scheduler": "normal", "denoise": 1.0}},
            "8": {"class_type": "VAEDecode", "inputs": {"samples": ["3", 0], "vae": ["4", 2]}},
            "9": {"class_type": "SaveImage",
                  "inputs": {"filename_prefix": "ComfyUI", "images": ["8", 0]}}
        }))
        .unwrap()
    }

    fn target() -> MutationTarget {
        let mut t = MutationTarget::new(
            &PromptPair { positive: "a cat".to_string(), negative: "blurry".to_string() },
            512,
            768,
        );
        t.seed = Some(42);
        t.checkpoint = Some("new.safetensors".to_string());
        t.filename_prefix = Some("assetgen_x".to_string());
        t
    }

    fn inputs<'a>(doc: &'a JobDocument, id: &str) -> &'a Value {
        &doc.node(id).unwrap()["inputs"]
    }

    #[test]
    fn routes_prompts_by_title() {
        let mut doc = base();
        mutate(&mut doc, &target());
        assert_eq!(inputs(&doc, "6")["text"], "a cat");
        assert_eq!(inputs(&doc, "7")["text"], "blurry");
    }

    #[test]
    fn untitled_nodes_fall_back_to_position() {
        let mut doc = JobDocument::from_value(json!({
            "1": {"class_type": "CLIPTextEncode", "inputs": {"text": ""}},
            "2": {"class_type": "CLIPTextEncode", "inputs": {"text": ""}},
            "3": {"class_type": "CLIPTextEncode", "inputs": {"text": ""}}
        }))
        .unwrap();
        set_text_inputs(&mut doc, "pos", "neg");
        assert_eq!(inputs(&doc, "1")["text"], "pos");
        assert_eq!(inputs(&doc, "2")["text"], "neg");
        assert_eq!(inputs(&doc, "3")["text"], "pos");
    }

    #[test]
    fn dual_text_nodes_get_both_fields() {
        let mut doc = JobDocument::from_value(json!({
            "1": {"class_type": "CLIPTextEncodeSDXL", "_meta": {"title": "neg"},
                  "inputs": {"text_g": "", "text_l": "", "width": 4096}}
        }))
        .unwrap();
        set_text_inputs(&mut doc, "pos", "negative words");
        assert_eq!(inputs(&doc, "1")["text_g"], "negative words");
        assert_eq!(inputs(&doc, "1")["text_l"], "negative words");
    }

    #[test]
    fn sizes_seeds_and_prefixes() {
        let mut doc = base();
        mutate(&mut doc, &target());
        assert_eq!(inputs(&doc, "5")["width"], 512);
        assert_eq!(inputs(&doc, "5")["height"], 768);
        assert_eq!(inputs(&doc, "5")["batch_size"], 1);
        assert_eq!(inputs(&doc, "3")["seed"], 42);
        assert_eq!(inputs(&doc, "4")["ckpt_name"], "new.safetensors");
        assert_eq!(inputs(&doc, "9")["filename_prefix"], "assetgen_x");
    }

    #[test]
    fn conditioning_sizes_and_crops() {
        let mut doc = JobDocument::from_value(json!({
            "1": {"class_type": "CLIPTextEncodeSDXL", "inputs": {"text_g": "", "text_l": "",
                  "width": 4096, "height": 4096, "target_width": 4096, "target_height": 4096,
                  "crop_w": 12, "crop_h": 8}}
        }))
        .unwrap();
        set_size_inputs(&mut doc, 640, 480);
        let i = inputs(&doc, "1");
        assert_eq!((i["width"].clone(), i["height"].clone()), (json!(640), json!(480)));
        assert_eq!(i["target_width"], json!(640));
        assert_eq!(i["target_height"], json!(480));
        assert_eq!((i["crop_w"].clone(), i["crop_h"].clone()), (json!(0), json!(0)));
    }

    #[test]
    fn linked_size_inputs_are_left_alone() {
        let mut doc = JobDocument::from_value(json!({
            "1": {"class_type": "EmptyLatentImage", "inputs": {"width": ["2", 0], "height": 1024}}
        }))
        .unwrap();
        set_size_inputs(&mut doc, 640, 480);
        assert_eq!(inputs(&doc, "1")["width"], json!(["2", 0]));
        assert_eq!(inputs(&doc, "1")["height"], 1024);
    }

    #[test]
    fn checkpoint_replaces_first_alias_only() {
        let mut doc = JobDocument::from_value(json!({
            "1": {"class_type": "Custom", "inputs": {"checkpoint": "a", "model_name": "b"}}
        }))
        .unwrap();
        set_checkpoint_inputs(&mut doc, "z");
        assert_eq!(inputs(&doc, "1")["checkpoint"], "z");
        assert_eq!(inputs(&doc, "1")["model_name"], "b");
    }

    #[test]
    fn vae_without_loader_reports_false() {
        let mut doc = base();
        let before = doc.clone();
        assert!(!set_vae_inputs(&mut doc, "sdxl_vae.safetensors"));
        assert_eq!(doc, before);
    }

    #[test]
    fn vae_wires_decoders_to_first_loader() {
        let mut doc = base();
        let mut extra = doc.clone().into_value();
        extra["20"] = json!({"class_type": "VAELoader", "inputs": {"vae_name": "old.vae"}});
        extra["21"] = json!({"class_type": "VAELoader", "inputs": {"vae_name": "other.vae"}});
        doc = JobDocument::from_value(extra).unwrap();

        let mut t = target();
        t.vae = Some("sdxl_vae.safetensors".to_string());
        let outcome = mutate(&mut doc, &t);
        assert!(outcome.vae_applied);
        assert_eq!(inputs(&doc, "20")["vae_name"], "sdxl_vae.safetensors");
        assert_eq!(inputs(&doc, "21")["vae_name"], "sdxl_vae.safetensors");
        assert_eq!(inputs(&doc, "8")["vae"], json!(["20", 0]));
    }

    #[test]
    fn sampler_overrides_touch_only_samplers() {
        let mut doc = JobDocument::from_value(json!({
            "1": {"class_type": "KSamplerAdvanced",
                  "inputs": {"steps": 20, "cfg": 7,
                             "sampler_name": "euler", "scheduler": "normal"}},
            "2": {"class_type": "Upscaler", "inputs": {"steps": 4}}
        }))
        .unwrap();
        let copax = SamplerOverrides::from(crate::prompt::Style::Copax.sampler());
        set_sampler_inputs(&mut doc, &copax);
        assert_eq!(inputs(&doc, "1")["steps"], 35);
        assert_eq!(inputs(&doc, "1")["cfg"], 6.0);
        assert_eq!(inputs(&doc, "1")["sampler_name"], "dpmpp_3m_sde");
        assert_eq!(inputs(&doc, "1")["scheduler"], "exponential");
        assert_eq!(inputs(&doc, "2")["steps"], 4);
    }

    #[test]
    fn mutation_is_idempotent() {
        let mut once = base();
        mutate(&mut once, &target());
        let mut twice = once.clone();
        mutate(&mut twice, &target());
        assert_eq!(once, twice);
    }

    #[test]
    fn unknown_fields_survive() {
        let mut doc = base();
        mutate(&mut doc, &target());
        assert_eq!(inputs(&doc, "3")["denoise"], 1.0);
        assert_eq!(inputs(&doc, "6")["clip"], json!(["4", 1]));
        assert_eq!(doc.node("6").unwrap()["_meta"]["title"], "Positive Prompt");
    }
}
