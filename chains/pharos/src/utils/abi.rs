//! Calldata encoding and return data decoding by function signature.

use core_logic::WorkflowError;
use ethers::abi::{self, ParamType, Token};
use ethers::types::{Address, Bytes, U256};
use ethers::utils::{format_units, id, parse_units};

/// `selector(signature) ++ abi.encode(args)`
pub fn encode_call(signature: &str, args: &[Token]) -> Bytes {
    let mut data = id(signature).to_vec();
    data.extend(abi::encode(args));
    Bytes::from(data)
}

fn decode_one(kind: ParamType, data: &[u8], what: &str) -> Result<Token, WorkflowError> {
    abi::decode(&[kind], data)
        .ok()
        .and_then(|tokens| tokens.into_iter().next())
        .ok_or_else(|| WorkflowError::rpc("eth_call", format!("cannot decode {} from 0x{}", what, hex::encode(data))))
}

pub fn decode_uint(data: &[u8]) -> Result<U256, WorkflowError> {
    decode_one(ParamType::Uint(256), data, "uint256")?
        .into_uint()
        .ok_or_else(|| WorkflowError::rpc("eth_call", "expected uint256"))
}

pub fn decode_address(data: &[u8]) -> Result<Address, WorkflowError> {
    decode_one(ParamType::Address, data, "address")?
        .into_address()
        .ok_or_else(|| WorkflowError::rpc("eth_call", "expected address"))
}

pub fn decode_bytes32_array(data: &[u8]) -> Result<Vec<Vec<u8>>, WorkflowError> {
    let kind = ParamType::Array(Box::new(ParamType::FixedBytes(32)));
    decode_one(kind, data, "bytes32[]")?
        .into_array()
        .map(|items| items.into_iter().filter_map(Token::into_fixed_bytes).collect())
        .ok_or_else(|| WorkflowError::rpc("eth_call", "expected bytes32[]"))
}

/// `r ++ s ++ v` as the 65-byte signature the identity contract expects.
pub fn pack_signature(r: &str, s: &str, v: u64) -> Result<Bytes, WorkflowError> {
    let mut packed = Vec::with_capacity(65);
    for (name, part) in [("r", r), ("s", s)] {
        let raw = hex::decode(part.trim_start_matches("0x"))
            .map_err(|e| WorkflowError::precondition(format!("signature {} is not hex: {}", name, e)))?;
        if raw.len() > 32 {
            return Err(WorkflowError::precondition(format!(
                "signature {} is {} bytes",
                name,
                raw.len()
            )));
        }
        packed.extend(std::iter::repeat(0u8).take(32 - raw.len()));
        packed.extend(raw);
    }
    let v = u8::try_from(v)
        .map_err(|_| WorkflowError::precondition(format!("signature v {} out of range", v)))?;
    packed.push(v);
    Ok(Bytes::from(packed))
}

/// Human amount to base units, e.g. `1.5` with 6 decimals is `1_500_000`.
pub fn to_units(amount: f64, decimals: u32) -> Result<U256, WorkflowError> {
    parse_units(amount.to_string(), decimals)
        .map(Into::into)
        .map_err(|e| WorkflowError::precondition(format!("invalid amount {}: {}", amount, e)))
}

pub fn format_amount(amount: U256, decimals: u32) -> String {
    format_units(amount, decimals).unwrap_or_else(|_| amount.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_call_prefixes_selector() {
        let spender = Address::repeat_byte(0xab);
        let data = encode_call(
            "approve(address,uint256)",
            &[Token::Address(spender), Token::Uint(U256::from(1000))],
        );
        assert_eq!(&data[..4], &[0x09, 0x5e, 0xa7, 0xb3]);
        assert_eq!(data.len(), 4 + 64);
        assert_eq!(&data[16..36], spender.as_bytes());
    }

    #[test]
    fn test_decoders() {
        let word = abi::encode(&[Token::Uint(U256::from(42))]);
        assert_eq!(decode_uint(&word).unwrap(), U256::from(42));

        let addr = Address::repeat_byte(7);
        assert_eq!(decode_address(&abi::encode(&[Token::Address(addr)])).unwrap(), addr);

        let ids = abi::encode(&[Token::Array(vec![Token::FixedBytes(vec![1u8; 32])])]);
        assert_eq!(decode_bytes32_array(&ids).unwrap(), vec![vec![1u8; 32]]);

        assert!(decode_uint(&[]).is_err());
    }

    #[test]
    fn test_pack_signature_pads_components() {
        let sig = pack_signature("0x01", "0x02", 27).unwrap();
        assert_eq!(sig.len(), 65);
        assert_eq!(sig[31], 1);
        assert_eq!(sig[63], 2);
        assert_eq!(sig[64], 27);
        assert!(pack_signature("zz", "0x02", 27).is_err());
    }

    #[test]
    fn test_amount_conversion() {
        assert_eq!(to_units(1.5, 6).unwrap(), U256::from(1_500_000));
        assert_eq!(format_amount(U256::from(50_000_000u64), 6), "50.000000");
    }
}
