//! Declarative description of the NF-e fields that are extracted.
//!
//! Each block names a scope relative to `infNFe` and the fields read from it.
//! A block whose scope is absent contributes no keys; a field whose leaf is
//! absent inside a present block is reported as `"0"`.

/// How a field path is resolved within its scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lookup {
    /// Chain of direct children (`enderEmit/UF`).
    Child,
    /// First descendant with the given name, at any depth.
    Descendant,
}

/// Post-processing applied to a located value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transform {
    Verbatim,
    /// Numeric UF code to two-letter abbreviation. The default sentinel is left alone.
    StateAbbreviation,
}

/// One output field.
#[derive(Debug, Clone, Copy)]
pub struct FieldSpec {
    pub label: &'static str,
    pub path: &'static str,
    pub lookup: Lookup,
    pub transform: Transform,
}

/// A group of fields read from one sub-block.
#[derive(Debug, Clone, Copy)]
pub struct BlockSpec {
    /// Block identifier, used in logs and warnings.
    pub name: &'static str,
    pub scope: &'static str,
    pub scope_lookup: Lookup,
    pub fields: &'static [FieldSpec],
}

const fn field(label: &'static str, path: &'static str) -> FieldSpec {
    FieldSpec { label, path, lookup: Lookup::Child, transform: Transform::Verbatim }
}

const fn state(label: &'static str, path: &'static str) -> FieldSpec {
    FieldSpec { label, path, lookup: Lookup::Child, transform: Transform::StateAbbreviation }
}

const fn deep(label: &'static str, path: &'static str) -> FieldSpec {
    FieldSpec { label, path, lookup: Lookup::Descendant, transform: Transform::Verbatim }
}

const fn block(name: &'static str, scope: &'static str, fields: &'static [FieldSpec]) -> BlockSpec {
    BlockSpec { name, scope, scope_lookup: Lookup::Child, fields }
}

/// Header blocks, in output order.
pub const HEADER_BLOCKS: &[BlockSpec] = &[
    block("identification", "ide", &[
        field("Número NF", "nNF"),
        field("Série", "serie"),
        field("Data Emissão", "dhEmi"),
        field("Data Saída/Entrada", "dhSaiEnt"),
        field("Natureza Operação", "natOp"),
        field("Tipo NF", "tpNF"),
        field("Modelo", "mod"),
        state("UF", "cUF"),
        field("UF Código", "cUF"),
        field("Finalidade", "finNFe"),
    ]),
    block("issuer", "emit", &[
        field("Emitente CNPJ", "CNPJ"),
        field("Emitente Nome", "xNome"),
        field("Emitente Fantasia", "xFant"),
        field("Emitente IE", "IE"),
        state("Emitente UF", "enderEmit/UF"),
        field("Emitente Município", "enderEmit/xMun"),
        field("Emitente CEP", "enderEmit/CEP"),
    ]),
    block("recipient", "dest", &[
        field("Destinatário CNPJ", "CNPJ"),
        field("Destinatário Nome", "xNome"),
        field("Destinatário IE", "IE"),
        state("Destinatário UF", "enderDest/UF"),
        field("Destinatário Município", "enderDest/xMun"),
        field("Destinatário CEP", "enderDest/CEP"),
    ]),
    block("transport", "transp", &[
        field("Modalidade Frete", "modFrete"),
    ]),
    block("carrier", "transp/transporta", &[
        field("Transportadora Nome", "xNome"),
        field("Transportadora CNPJ", "CNPJ"),
        state("Transportadora UF", "UF"),
    ]),
    block("volumes", "transp/vol", &[
        field("Qtde Volumes", "qVol"),
        field("Peso Líquido", "pesoL"),
        field("Peso Bruto", "pesoB"),
    ]),
    block("invoice", "cobr/fat", &[
        field("Número Fatura", "nFat"),
        field("Valor Original", "vOrig"),
        field("Valor Líquido", "vLiq"),
    ]),
    block("installment", "cobr/dup", &[
        field("Número Duplicata", "nDup"),
        field("Data Vencimento", "dVenc"),
        field("Valor Duplicata", "vDup"),
    ]),
    BlockSpec {
        name: "totals",
        scope: "ICMSTot",
        scope_lookup: Lookup::Descendant,
        fields: &[
            field("Base ICMS", "vBC"),
            field("Valor ICMS", "vICMS"),
            field("Valor Produtos", "vProd"),
            field("Valor NF", "vNF"),
            field("Valor Frete", "vFrete"),
            field("Valor IPI", "vIPI"),
            field("Valor COFINS", "vCOFINS"),
            field("Valor PIS", "vPIS"),
        ],
    },
];

/// Repeating line-item element under `infNFe`.
pub const ITEM_ELEMENT: &str = "det";

/// Attribute carrying the 1-based item index.
pub const ITEM_INDEX_ATTR: &str = "nItem";

/// Output label for the item index.
pub const ITEM_INDEX_LABEL: &str = "Item";

/// Product fields, read from `det/prod`. Rows without `prod` are skipped.
pub const PRODUCT_BLOCK: BlockSpec = block("product", "prod", &[
    field("Código", "cProd"),
    field("Descrição", "xProd"),
    field("NCM", "NCM"),
    field("CFOP", "CFOP"),
    field("Unidade", "uCom"),
    field("Quantidade", "qCom"),
    field("Valor Unitário", "vUnCom"),
    field("Valor Total", "vProd"),
]);

/// Per-line tax amounts, read from `det/imposto`.
///
/// The element holding each amount depends on the tax regime (`ICMS00`,
/// `ICMS20`, `IPITrib`, ...), so each value is a descendant search.
pub const ITEM_TAX_BLOCK: BlockSpec = block("item taxes", "imposto", &[
    deep("ICMS", "vICMS"),
    deep("IPI", "vIPI"),
    deep("PIS", "vPIS"),
    deep("COFINS", "vCOFINS"),
]);
