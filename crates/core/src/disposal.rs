use crate::models::{AnalysisResult, ClassId, WasteType};
use crate::tables::LookupTables;

impl LookupTables {
    pub fn resolve(&self, class_id: ClassId) -> AnalysisResult {
        let bin_type = self.bin_type(class_id);

        AnalysisResult {
            detected_issue: self.sanitation_issue(class_id).to_string(),
            bin_type,
            waste_type: WasteType::for_bin(bin_type),
            class_id,
        }
    }
}

/// Resolves against the built-in tables.
pub fn resolve_disposal(class_id: ClassId) -> AnalysisResult {
    LookupTables::builtin().resolve(class_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::BinType;

    #[test]
    fn non_decomposable_ids_resolve_blue() {
        let tables = LookupTables::builtin();
        for id in tables.non_decomposable_ids() {
            let result = tables.resolve(id);
            assert_eq!(result.bin_type, BinType::Blue, "class {id}");
            assert_eq!(result.waste_type, WasteType::NonDecomposable, "class {id}");
        }
    }

    #[test]
    fn decomposable_ids_resolve_green() {
        let tables = LookupTables::builtin();
        for id in tables.decomposable_ids() {
            let result = tables.resolve(id);
            assert_eq!(result.bin_type, BinType::Green, "class {id}");
            assert_eq!(result.waste_type, WasteType::Decomposable, "class {id}");
        }
    }

    #[test]
    fn ids_outside_both_tables_are_unknown() {
        let tables = LookupTables::builtin();
        for id in (0..1000u16).filter(|id| tables.bin_type(*id) == BinType::Unknown) {
            let result = tables.resolve(id);
            assert_eq!(result.waste_type, WasteType::Unknown, "class {id}");
        }
    }

    #[test]
    fn resolve_is_idempotent() {
        for id in [0, 483, 605, 937, 999] {
            assert_eq!(resolve_disposal(id), resolve_disposal(id));
        }
    }

    #[test]
    fn class_937_is_green_other() {
        let result = resolve_disposal(937);
        assert_eq!(result.detected_issue, "other");
        assert_eq!(result.bin_type, BinType::Green);
        assert_eq!(result.waste_type, WasteType::Decomposable);
        assert_eq!(result.class_id, 937);
    }

    #[test]
    fn class_483_is_garbage_with_unknown_bin() {
        let result = resolve_disposal(483);
        assert_eq!(result.detected_issue, "garbage");
        assert_eq!(result.bin_type, BinType::Unknown);
        assert_eq!(result.waste_type, WasteType::Unknown);
    }

    #[test]
    fn class_605_is_waste_in_blue_bin() {
        let result = resolve_disposal(605);
        assert_eq!(result.detected_issue, "waste");
        assert_eq!(result.bin_type, BinType::Blue);
    }
}
