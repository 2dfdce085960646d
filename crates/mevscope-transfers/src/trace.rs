use ethereum_types::{Address, U256};
use mevscope_core::{error::Result, types::CallFrame, utils, Error};

/// Chamada achatada de um call trace, na ordem de execução (pré-ordem)
#[derive(Debug, Clone)]
pub struct FlatCall {
    pub index: usize,
    pub depth: usize,
    pub from: Address,
    pub to: Option<Address>,
    pub value: U256,
    pub input: Vec<u8>,
}

/// Achata a árvore de chamadas em pré-ordem, atribuindo índices densos
pub fn flatten_trace(frame: &CallFrame) -> Result<Vec<FlatCall>> {
    let mut calls = Vec::new();
    flatten_node(frame, 0, &mut calls)?;
    Ok(calls)
}

fn flatten_node(frame: &CallFrame, depth: usize, out: &mut Vec<FlatCall>) -> Result<()> {
    let from = utils::hex_to_address(&frame.from)
        .ok_or_else(|| Error::DecodeError(format!("Endereço inválido: {}", frame.from)))?;

    let to = if frame.to.is_empty() {
        None
    } else {
        Some(
            utils::hex_to_address(&frame.to)
                .ok_or_else(|| Error::DecodeError(format!("Endereço inválido: {}", frame.to)))?,
        )
    };

    let value = match frame.value.as_deref() {
        Some(v) => utils::hex_to_u256(v)
            .ok_or_else(|| Error::DecodeError(format!("Valor inválido: {}", v)))?,
        None => U256::zero(),
    };

    let input = hex::decode(frame.input.trim_start_matches("0x"))
        .map_err(|_| Error::DecodeError(format!("Input inválido: {}", frame.input)))?;

    out.push(FlatCall {
        index: out.len(),
        depth,
        from,
        to,
        value,
        input,
    });

    if let Some(children) = &frame.calls {
        for child in children {
            flatten_node(child, depth + 1, out)?;
        }
    }

    Ok(())
}
