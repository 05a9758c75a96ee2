use serde::{Deserialize, Serialize};

/// The fixed set of outfit occasions. Every session carries exactly one record per style.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Style {
    Casual,
    Business,
    NightOut,
}

impl Style {
    pub const ALL: [Style; 3] = [Style::Casual, Style::Business, Style::NightOut];

    pub fn label(&self) -> &'static str {
        match self {
            Self::Casual => "Casual",
            Self::Business => "Business",
            Self::NightOut => "Night Out",
        }
    }

    pub fn slug(&self) -> &'static str {
        match self {
            Self::Casual => "casual",
            Self::Business => "business",
            Self::NightOut => "night-out",
        }
    }

    /// Stable record id assigned at initialization.
    pub fn record_id(&self) -> &'static str {
        match self {
            Self::Casual => "1",
            Self::Business => "2",
            Self::NightOut => "3",
        }
    }

    /// Accepts the label, the slug, or the snake_case name, case-insensitively.
    pub fn parse(raw: &str) -> Option<Self> {
        let normalized = raw
            .trim()
            .to_ascii_lowercase()
            .replace(['_', ' '], "-");
        match normalized.as_str() {
            "casual" => Some(Self::Casual),
            "business" => Some(Self::Business),
            "night-out" | "nightout" | "night" => Some(Self::NightOut),
            _ => None,
        }
    }

    pub fn download_file_name(&self) -> String {
        format!("virtual-stylist-{}.png", self.slug())
    }

    pub fn generation_instruction(&self) -> String {
        let occasion = self.label();
        format!(
            "You are a world-class fashion stylist.\n\
             Analyze the attached clothing item carefully.\n\
             Create a complete, high-fashion \"flat-lay\" outfit featuring this specific item for a \"{occasion}\" occasion.\n\
             The output image should be a top-down view of the items laid out neatly on a clean, neutral background.\n\
             Include matching accessories, shoes, and complementary clothing items that create a cohesive {occasion} look.\n\
             Ensure the original item is the centerpiece.\n\
             Do not include any text in the image.\n\
             Photorealistic, high quality, 4k."
        )
    }
}

impl std::fmt::Display for Style {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

pub fn edit_instruction(user_instruction: &str) -> String {
    format!(
        "Edit the attached fashion image based on this instruction: \"{}\".\n\
         Return ONLY the edited image. Do not explain what you did.\n\
         Maintain the flat-lay style, lighting, and high quality.",
        user_instruction.trim()
    )
}

/// Quick-select color themes; each one only pre-fills the edit instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColorTheme {
    Warm,
    Cool,
    Monochrome,
    Earthy,
    Pastel,
    Vibrant,
}

impl ColorTheme {
    pub const ALL: [ColorTheme; 6] = [
        ColorTheme::Warm,
        ColorTheme::Cool,
        ColorTheme::Monochrome,
        ColorTheme::Earthy,
        ColorTheme::Pastel,
        ColorTheme::Vibrant,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            Self::Warm => "Warm",
            Self::Cool => "Cool",
            Self::Monochrome => "Monochrome",
            Self::Earthy => "Earthy",
            Self::Pastel => "Pastel",
            Self::Vibrant => "Vibrant",
        }
    }

    pub fn instruction(&self) -> &'static str {
        match self {
            Self::Warm => "Shift the outfit to a warm color palette with rich reds, oranges, and golden tones",
            Self::Cool => "Shift the outfit to a cool color palette with blues, teals, and silver tones",
            Self::Monochrome => "Restyle the outfit in a monochrome palette using shades of a single color",
            Self::Earthy => "Recolor the outfit with earthy tones like olive, terracotta, camel, and brown",
            Self::Pastel => "Soften the outfit into a pastel palette with blush pink, mint, lavender, and baby blue",
            Self::Vibrant => "Make the outfit vibrant with bold, saturated, high-contrast colors",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        let normalized = raw.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|theme| theme.label().to_ascii_lowercase() == normalized)
    }
}
