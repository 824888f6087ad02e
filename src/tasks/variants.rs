use std::fmt;
use std::str::FromStr;

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ToolVariant {
    ImageEnhancer,
    ImageToVideo,
    BackgroundRemover,
    PhotoRestorer,
    TextToImage,
}

impl ToolVariant {
    pub const ALL: [Self; 5] = [
        Self::ImageEnhancer,
        Self::ImageToVideo,
        Self::BackgroundRemover,
        Self::PhotoRestorer,
        Self::TextToImage,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::ImageEnhancer => "image-enhancer",
            Self::ImageToVideo => "image-to-video",
            Self::BackgroundRemover => "background-remover",
            Self::PhotoRestorer => "photo-restorer",
            Self::TextToImage => "text-to-image",
        }
    }

    pub fn spec(self) -> &'static VariantSpec {
        VARIANT_TABLE
            .iter()
            .find(|entry| entry.variant == self)
            .unwrap_or_else(|| unreachable!("every tool variant has a registry entry"))
    }
}

impl fmt::Display for ToolVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ToolVariant {
    type Err = UnknownToolVariant;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let needle = value.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|variant| variant.as_str() == needle)
            .ok_or_else(|| UnknownToolVariant(value.trim().to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown tool variant '{0}'")]
pub struct UnknownToolVariant(pub String);

/// Which field of the generic job input feeds a node binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum InputSource {
    #[serde(rename = "imageUrl")]
    ImageUrl,
    #[serde(rename = "prompt")]
    Prompt,
}

impl InputSource {
    pub fn field_name(self) -> &'static str {
        match self {
            Self::ImageUrl => "imageUrl",
            Self::Prompt => "prompt",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeFieldBinding {
    pub node_id: &'static str,
    pub field_name: &'static str,
    pub source: InputSource,
    pub required: bool,
    pub description: Option<&'static str>,
}

/// Kind of artifact a variant produces; selects the accepted output file types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputKind {
    Image,
    Video,
}

impl OutputKind {
    pub fn accepted_file_types(self) -> &'static [&'static str] {
        match self {
            Self::Image => &["png", "jpg", "jpeg"],
            Self::Video => &["mp4", "webm", "mov"],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariantSpec {
    pub variant: ToolVariant,
    pub submit_path: &'static str,
    pub bindings: &'static [NodeFieldBinding],
    pub output: OutputKind,
}

impl VariantSpec {
    pub fn required_sources(&self) -> impl Iterator<Item = InputSource> + '_ {
        self.bindings
            .iter()
            .filter(|binding| binding.required)
            .map(|binding| binding.source)
    }

    pub fn optional_sources(&self) -> impl Iterator<Item = InputSource> + '_ {
        self.bindings
            .iter()
            .filter(|binding| !binding.required)
            .map(|binding| binding.source)
    }
}

pub const AI_APP_RUN_PATH: &str = "/task/openapi/ai-app/run";

const VARIANT_TABLE: &[VariantSpec] = &[
    VariantSpec {
        variant: ToolVariant::ImageEnhancer,
        submit_path: AI_APP_RUN_PATH,
        bindings: &[NodeFieldBinding {
            node_id: "2",
            field_name: "image",
            source: InputSource::ImageUrl,
            required: true,
            description: None,
        }],
        output: OutputKind::Image,
    },
    VariantSpec {
        variant: ToolVariant::ImageToVideo,
        submit_path: AI_APP_RUN_PATH,
        bindings: &[
            NodeFieldBinding {
                node_id: "39",
                field_name: "image",
                source: InputSource::ImageUrl,
                required: true,
                description: Some("source image"),
            },
            NodeFieldBinding {
                node_id: "52",
                field_name: "prompt",
                source: InputSource::Prompt,
                required: false,
                description: Some("motion prompt"),
            },
        ],
        output: OutputKind::Video,
    },
    VariantSpec {
        variant: ToolVariant::BackgroundRemover,
        submit_path: AI_APP_RUN_PATH,
        bindings: &[NodeFieldBinding {
            node_id: "1",
            field_name: "image",
            source: InputSource::ImageUrl,
            required: true,
            description: None,
        }],
        output: OutputKind::Image,
    },
    VariantSpec {
        variant: ToolVariant::PhotoRestorer,
        submit_path: AI_APP_RUN_PATH,
        bindings: &[NodeFieldBinding {
            node_id: "12",
            field_name: "image",
            source: InputSource::ImageUrl,
            required: true,
            description: None,
        }],
        output: OutputKind::Image,
    },
    VariantSpec {
        variant: ToolVariant::TextToImage,
        submit_path: AI_APP_RUN_PATH,
        bindings: &[NodeFieldBinding {
            node_id: "6",
            field_name: "text",
            source: InputSource::Prompt,
            required: true,
            description: Some("positive prompt"),
        }],
        output: OutputKind::Image,
    },
];

pub fn all() -> &'static [VariantSpec] {
    VARIANT_TABLE
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    #[test]
    fn every_variant_has_exactly_one_registry_entry() {
        for variant in ToolVariant::ALL {
            let count = VARIANT_TABLE
                .iter()
                .filter(|entry| entry.variant == variant)
                .count();
            assert_eq!(count, 1, "registry entries for {variant}");
        }
        assert_eq!(VARIANT_TABLE.len(), ToolVariant::ALL.len());
    }

    #[test]
    fn every_variant_requires_at_least_one_input() {
        for entry in all() {
            assert!(
                entry.required_sources().next().is_some(),
                "{} has no required binding",
                entry.variant
            );
        }
    }

    #[test]
    fn slugs_are_unique_and_round_trip_through_from_str() {
        let mut seen = BTreeSet::new();
        for variant in ToolVariant::ALL {
            assert!(seen.insert(variant.as_str()));
            assert_eq!(variant.as_str().parse::<ToolVariant>(), Ok(variant));
        }
    }

    #[test]
    fn parsing_is_case_insensitive_and_trims() {
        assert_eq!(
            " Image-Enhancer ".parse::<ToolVariant>(),
            Ok(ToolVariant::ImageEnhancer)
        );
        assert_eq!(
            "upscaler".parse::<ToolVariant>(),
            Err(UnknownToolVariant(String::from("upscaler")))
        );
    }

    #[test]
    fn image_to_video_declares_optional_prompt_after_image() {
        let spec = ToolVariant::ImageToVideo.spec();
        assert_eq!(spec.bindings[0].source, InputSource::ImageUrl);
        assert!(spec.bindings[0].required);
        assert_eq!(spec.bindings[1].source, InputSource::Prompt);
        assert!(!spec.bindings[1].required);
        assert_eq!(spec.output, OutputKind::Video);
    }

    #[test]
    fn image_enhancer_binds_node_two_image_field() {
        let spec = ToolVariant::ImageEnhancer.spec();
        assert_eq!(spec.bindings.len(), 1);
        assert_eq!(spec.bindings[0].node_id, "2");
        assert_eq!(spec.bindings[0].field_name, "image");
    }
}
