//! Builds the `signature.json`-equivalent metadata describing where
//! each argument and the return value live in the device's slot
//! buffer, grounded on `original_source`'s `metadata_generator.py`.

use serde::Serialize;

use p4jit_proto::{ParamCategory, Signature};

#[derive(Debug, Clone, Serialize)]
pub struct ArgumentAddress {
    pub index: usize,
    pub slot: u32,
    pub slot_count: u32,
    pub name: String,
    pub category: ParamCategoryRepr,
    pub address: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ParamCategoryRepr {
    Value,
    Pointer,
}

impl From<ParamCategory> for ParamCategoryRepr {
    fn from(c: ParamCategory) -> Self {
        match c {
            ParamCategory::Value => ParamCategoryRepr::Value,
            ParamCategory::Pointer => ParamCategoryRepr::Pointer,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ReturnAddress {
    pub slot: u32,
    pub slot_count: u32,
    pub address: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct FunctionMetadata {
    pub name: String,
    pub wrapper_entry: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct AddressesMetadata {
    pub code_base: u32,
    pub arg_base: u32,
    pub args_array_size: u32,
    pub args_array_bytes: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct Metadata {
    pub name: String,
    pub function: FunctionMetadata,
    pub addresses: AddressesMetadata,
    pub arguments: Vec<ArgumentAddress>,
    pub result: ReturnAddress,
}

pub struct MetadataBuilder {
    pub signature: Signature,
    pub arg_base: u32,
    pub code_base: u32,
    pub args_array_size: u32,
    pub wrapper_entry: String,
}

impl MetadataBuilder {
    /// Assigns each parameter a starting slot, 32-bit values and
    /// pointers consuming one slot and 64-bit values consuming two,
    /// then places the return value in the trailing slot(s) of the
    /// args array (spec.md §4.6's slot layout, identical for both
    /// passes since only `code_base` changes between them).
    pub fn build(&self) -> Metadata {
        let mut arguments = Vec::with_capacity(self.signature.parameters.len());
        let mut slot = 0u32;
        for (index, param) in self.signature.parameters.iter().enumerate() {
            let slot_count = param.ty.slot_count();
            arguments.push(ArgumentAddress {
                index,
                slot,
                slot_count,
                name: param.name.clone(),
                category: param.category.into(),
                address: self.arg_base + slot * 4,
            });
            slot += slot_count;
        }

        let return_slot_count = self.signature.return_type.slot_count().max(1);
        let return_slot = self.args_array_size.saturating_sub(return_slot_count);
        let result = ReturnAddress {
            slot: return_slot,
            slot_count: return_slot_count,
            address: self.arg_base + return_slot * 4,
        };

        Metadata {
            name: self.signature.name.clone(),
            function: FunctionMetadata {
                name: self.signature.name.clone(),
                wrapper_entry: self.wrapper_entry.clone(),
            },
            addresses: AddressesMetadata {
                code_base: self.code_base,
                arg_base: self.arg_base,
                args_array_size: self.args_array_size,
                args_array_bytes: self.args_array_size * 4,
            },
            arguments,
            result,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use p4jit_proto::{CType, Parameter};

    fn signature() -> Signature {
        Signature {
            name: "mix".to_string(),
            return_type: CType::F64,
            parameters: vec![
                Parameter {
                    name: "samples".to_string(),
                    ty: CType::Pointer(Box::new(CType::F32)),
                    category: ParamCategory::Pointer,
                },
                Parameter {
                    name: "count".to_string(),
                    ty: CType::I32,
                    category: ParamCategory::Value,
                },
                Parameter {
                    name: "gain".to_string(),
                    ty: CType::I64,
                    category: ParamCategory::Value,
                },
            ],
        }
    }

    #[test]
    fn assigns_increasing_slots_by_width() {
        let builder = MetadataBuilder {
            signature: signature(),
            arg_base: 0x5000_0000,
            code_base: 0x4008_0000,
            args_array_size: 32,
            wrapper_entry: "call_remote".to_string(),
        };
        let metadata = builder.build();
        assert_eq!(metadata.arguments[0].slot, 0);
        assert_eq!(metadata.arguments[0].slot_count, 1);
        assert_eq!(metadata.arguments[1].slot, 1);
        assert_eq!(metadata.arguments[1].slot_count, 1);
        assert_eq!(metadata.arguments[2].slot, 2);
        assert_eq!(metadata.arguments[2].slot_count, 2);
    }

    #[test]
    fn return_value_occupies_trailing_slots() {
        let builder = MetadataBuilder {
            signature: signature(),
            arg_base: 0x5000_0000,
            code_base: 0x4008_0000,
            args_array_size: 32,
            wrapper_entry: "call_remote".to_string(),
        };
        let metadata = builder.build();
        assert_eq!(metadata.result.slot_count, 2);
        assert_eq!(metadata.result.slot, 30);
        assert_eq!(metadata.result.address, 0x5000_0000 + 30 * 4);
    }

    #[test]
    fn serializes_addresses_as_plain_integers() {
        let builder = MetadataBuilder {
            signature: signature(),
            arg_base: 0x5000_0000,
            code_base: 0x4008_0000,
            args_array_size: 32,
            wrapper_entry: "call_remote".to_string(),
        };
        let json = serde_json::to_value(builder.build()).unwrap();
        assert_eq!(json["addresses"]["args_array_bytes"], 128);
    }
}
