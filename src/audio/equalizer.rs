use serde::{Deserialize, Serialize};

/// Frecuencias centrales para el ecualizador de 10 bandas
pub const EQ_FREQUENCIES: [f32; 10] = [
    32.0,    // Sub-bass
    64.0,    // Bass
    125.0,   // Low-mid
    250.0,   // Mid
    500.0,   // Upper-mid
    1000.0,  // Presence
    2000.0,  // Brilliance
    4000.0,  // High
    8000.0,  // Very high
    16000.0, // Air
];

/// Presets de ecualizador disponibles
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum EqualizerPreset {
    #[default]
    Flat,
    Bass,
    Pop,
    Rock,
    Jazz,
    Classical,
    Electronic,
    Vocal,
}

impl EqualizerPreset {
    pub const ALL: [EqualizerPreset; 8] = [
        EqualizerPreset::Flat,
        EqualizerPreset::Bass,
        EqualizerPreset::Pop,
        EqualizerPreset::Rock,
        EqualizerPreset::Jazz,
        EqualizerPreset::Classical,
        EqualizerPreset::Electronic,
        EqualizerPreset::Vocal,
    ];

    /// Ganancias en dB para cada banda de [`EQ_FREQUENCIES`]
    pub fn gains(&self) -> [f32; 10] {
        match self {
            EqualizerPreset::Flat => [0.0; 10],
            EqualizerPreset::Bass => [6.0, 5.0, 4.0, 2.0, 0.0, 0.0, 0.0, 0.0, 0.0, 0.0],
            EqualizerPreset::Pop => [-1.0, 2.0, 4.0, 5.0, 3.0, 0.0, -1.0, -1.0, 0.0, 0.0],
            EqualizerPreset::Rock => [5.0, 4.0, 3.0, 1.0, -1.0, -1.0, 0.0, 2.0, 3.0, 4.0],
            EqualizerPreset::Jazz => [0.0, 1.0, 2.0, 3.0, 2.0, 1.0, 0.0, 1.0, 2.0, 3.0],
            EqualizerPreset::Classical => [0.0, 0.0, 0.0, 0.0, 0.0, 0.0, -2.0, -2.0, -2.0, -3.0],
            EqualizerPreset::Electronic => [5.0, 4.0, 1.0, 0.0, -2.0, 2.0, 1.0, 0.0, 3.0, 4.0],
            EqualizerPreset::Vocal => [-2.0, -1.0, 0.0, 2.0, 4.0, 3.0, 2.0, 1.0, 0.0, -1.0],
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            EqualizerPreset::Flat => "flat",
            EqualizerPreset::Bass => "bass",
            EqualizerPreset::Pop => "pop",
            EqualizerPreset::Rock => "rock",
            EqualizerPreset::Jazz => "jazz",
            EqualizerPreset::Classical => "classical",
            EqualizerPreset::Electronic => "electronic",
            EqualizerPreset::Vocal => "vocal",
        }
    }
}

impl std::str::FromStr for EqualizerPreset {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.to_lowercase();
        // "normal" era el nombre viejo del preset plano
        if wanted == "normal" {
            return Ok(EqualizerPreset::Flat);
        }
        Self::ALL
            .into_iter()
            .find(|preset| preset.as_str() == wanted)
            .ok_or_else(|| format!("Preset de ecualizador desconocido: {}", s))
    }
}

/// Ajustes de audio por sesión que el transporte aplica al stream activo
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AudioSettings {
    pub volume: f32,
    pub equalizer: EqualizerPreset,
}

impl AudioSettings {
    pub const MAX_VOLUME: f32 = 2.0;

    pub fn new(volume: f32) -> Self {
        Self {
            volume: volume.clamp(0.0, Self::MAX_VOLUME),
            equalizer: EqualizerPreset::Flat,
        }
    }
}
