use dashmap::DashMap;
use ethereum_types::Address;
use mevscope_core::utils::selector;
use std::collections::HashMap;

/// Operações suportadas pelo normalizador, em enumeração fechada.
/// Métodos desconhecidos caem em `Skip` em vez de passar silenciosamente.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MethodKind {
    Transfer,
    TransferFrom,
    Withdraw,
    Burn,
    BurnFrom,
    AddLiquidity,
    Skip,
}

/// Tabela de seletores por contrato, com fallback para a tabela ERC-20 padrão.
/// Entradas por contrato vêm de ABIs já conhecidas pela camada de armazenamento
/// e vivem num cache compartilhado entre classificações.
pub struct MethodRegistry {
    overrides: DashMap<Address, HashMap<[u8; 4], MethodKind>>,
    default_table: HashMap<[u8; 4], MethodKind>,
}

impl MethodRegistry {
    pub fn new() -> Self {
        let mut default_table = HashMap::new();
        default_table.insert(selector("transfer(address,uint256)"), MethodKind::Transfer);
        default_table.insert(selector("transferFrom(address,address,uint256)"), MethodKind::TransferFrom);
        default_table.insert(selector("withdraw(uint256)"), MethodKind::Withdraw);
        default_table.insert(selector("burn(uint256)"), MethodKind::Burn);
        default_table.insert(selector("burnFrom(address,uint256)"), MethodKind::BurnFrom);
        default_table.insert(selector("add_liquidity(uint256[2],uint256)"), MethodKind::AddLiquidity);

        Self {
            overrides: DashMap::new(),
            default_table,
        }
    }

    /// Registra um seletor específico de um contrato
    pub fn register(&self, contract: Address, sel: [u8; 4], kind: MethodKind) {
        self.overrides.entry(contract).or_default().insert(sel, kind);
    }

    /// Resolve o tipo de operação de uma chamada
    pub fn lookup(&self, contract: Address, input: &[u8]) -> MethodKind {
        if input.len() < 4 {
            return MethodKind::Skip;
        }
        let sel = [input[0], input[1], input[2], input[3]];

        if let Some(table) = self.overrides.get(&contract) {
            if let Some(kind) = table.get(&sel) {
                return *kind;
            }
        }

        self.default_table.get(&sel).copied().unwrap_or(MethodKind::Skip)
    }
}

impl Default for MethodRegistry {
    fn default() -> Self {
        Self::new()
    }
}
