//! Rule-based soil advice.
//!
//! Each recognized category contributes a fixed pair of advisory strings. Blocks are evaluated
//! in a fixed order (soil type, texture, moisture, fertility), which is also the order of the
//! output. Only two of the three categories per attribute carry advice; the middle or unmapped
//! ones contribute nothing. Organic matter has no rules.

pub const NOT_SOIL_MESSAGE: &str = "Imagem não reconhecida como solo. Tente uma foto mais clara do solo.";

pub const BLACK_SOIL: [&str; 2] = [
    "Excelente para cultivo de cereais e leguminosas",
    "Requer irrigação adequada devido à alta retenção de água",
];
pub const RED_SOIL: [&str; 2] = [
    "Ideal para cultivo de arroz e cana-de-açúcar",
    "Beneficia-se de adição de matéria orgânica",
];

pub const SANDY_TEXTURE: [&str; 2] = [
    "Adicione matéria orgânica para melhorar a retenção de água",
    "Considere irrigação mais frequente",
];
pub const CLAY_TEXTURE: [&str; 2] = [
    "Evite irrigação excessiva para prevenir compactação",
    "Use técnicas de aeração do solo",
];

pub const DRY_MOISTURE: [&str; 2] = [
    "Implemente sistema de irrigação",
    "Adicione cobertura morta para reter umidade",
];
pub const WATERLOGGED_MOISTURE: [&str; 2] = [
    "Melhore a drenagem do solo",
    "Evite irrigação excessiva",
];

pub const LOW_FERTILITY: [&str; 2] = [
    "Aplique fertilizantes orgânicos",
    "Considere rotação de culturas",
];
pub const HIGH_FERTILITY: [&str; 2] = [
    "Mantenha práticas de conservação do solo",
    "Monitore regularmente os nutrientes",
];

/// Maps a soil type and three attribute labels to the ordered advice list.
/// `None` means the attribute was unavailable and contributes nothing.
pub fn generate(soil_type: &str, texture: Option<&str>, moisture: Option<&str>, fertility: Option<&str>) -> Vec<String>
{
    let soil_block = match soil_type
    {
        "Black Soil" => Some(BLACK_SOIL),
        "Red soil" => Some(RED_SOIL),
        _ => None,
    };

    let texture_block = match texture
    {
        Some("arenoso") => Some(SANDY_TEXTURE),
        Some("argiloso") => Some(CLAY_TEXTURE),
        _ => None,
    };

    let moisture_block = match moisture
    {
        Some("seco") => Some(DRY_MOISTURE),
        Some("encharcado") => Some(WATERLOGGED_MOISTURE),
        _ => None,
    };

    let fertility_block = match fertility
    {
        Some("baixo") => Some(LOW_FERTILITY),
        Some("alto") => Some(HIGH_FERTILITY),
        _ => None,
    };

    [soil_block, texture_block, moisture_block, fertility_block]
        .into_iter()
        .flatten()
        .flatten()
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests
{
    use super::*;

    fn expected(blocks: &[[&str; 2]]) -> Vec<String>
    {
        blocks.iter().flatten().map(|s| s.to_string()).collect()
    }

    #[test]
    fn all_blocks_in_fixed_order()
    {
        let suggestions = generate("Black Soil", Some("arenoso"), Some("seco"), Some("baixo"));
        assert_eq!(suggestions.len(), 8);
        assert_eq!(suggestions, expected(&[BLACK_SOIL, SANDY_TEXTURE, DRY_MOISTURE, LOW_FERTILITY]));
    }

    #[test]
    fn other_branches()
    {
        let suggestions = generate("Red soil", Some("argiloso"), Some("encharcado"), Some("alto"));
        assert_eq!(suggestions, expected(&[RED_SOIL, CLAY_TEXTURE, WATERLOGGED_MOISTURE, HIGH_FERTILITY]));
    }

    #[test]
    fn middle_classes_contribute_nothing()
    {
        let suggestions = generate("Black Soil", Some("siltoso"), Some("úmido"), Some("médio"));
        assert_eq!(suggestions, expected(&[BLACK_SOIL]));
    }

    #[test]
    fn unknown_soil_type_contributes_nothing()
    {
        let suggestions = generate("Alluvial soil", Some("arenoso"), None, None);
        assert_eq!(suggestions, expected(&[SANDY_TEXTURE]));
    }

    #[test]
    fn labels_are_matched_exactly()
    {
        // Case matters: the soil classes come from directory names.
        assert!(generate("black soil", None, None, None).is_empty());
        assert!(generate("Red Soil", None, None, None).is_empty());
    }

    #[test]
    fn unavailable_attributes_contribute_nothing()
    {
        let suggestions = generate("Clay soil", None, None, None);
        assert!(suggestions.is_empty());
    }

    #[test]
    fn skipped_blocks_keep_the_remaining_order()
    {
        let suggestions = generate("Red soil", None, Some("seco"), Some("alto"));
        assert_eq!(suggestions, expected(&[RED_SOIL, DRY_MOISTURE, HIGH_FERTILITY]));
    }
}
