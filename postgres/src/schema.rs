//! Table definitions.

/// Statements run by [`crate::PostgresTicketStore::migrate`], in order
pub const MIGRATIONS: &[&str] = &[
    r"
    CREATE TABLE IF NOT EXISTS rifas (
        id BIGSERIAL PRIMARY KEY,
        titulo TEXT NOT NULL,
        producto_id BIGINT NOT NULL,
        rango_min INTEGER NOT NULL,
        rango_max INTEGER NOT NULL,
        precio_centavos BIGINT NOT NULL CHECK (precio_centavos > 0),
        estado TEXT NOT NULL DEFAULT 'CREADA',
        creado_en TIMESTAMPTZ NOT NULL DEFAULT now(),
        CHECK (rango_max >= rango_min)
    )
    ",
    r"
    CREATE TABLE IF NOT EXISTS numeros (
        rifa_id BIGINT NOT NULL REFERENCES rifas(id) ON DELETE CASCADE,
        numero INTEGER NOT NULL,
        estado TEXT NOT NULL DEFAULT 'DISPONIBLE',
        reservado_por_id BIGINT,
        comprado_por_id BIGINT,
        reservado_hasta TIMESTAMPTZ,
        actualizado_en TIMESTAMPTZ,
        PRIMARY KEY (rifa_id, numero)
    )
    ",
    "CREATE INDEX IF NOT EXISTS idx_numeros_estado ON numeros(rifa_id, estado, reservado_hasta)",
    "CREATE INDEX IF NOT EXISTS idx_numeros_reservado_por ON numeros(rifa_id, reservado_por_id)",
    r"
    CREATE TABLE IF NOT EXISTS participantes (
        id BIGSERIAL PRIMARY KEY,
        rifa_id BIGINT NOT NULL REFERENCES rifas(id) ON DELETE CASCADE,
        nombre TEXT NOT NULL,
        apellido TEXT NOT NULL,
        numero_telefono TEXT NOT NULL,
        numero_referencia TEXT NOT NULL,
        email TEXT,
        cantidad_numeros INTEGER NOT NULL CHECK (cantidad_numeros > 0),
        comprobante TEXT,
        payment_option_id BIGINT,
        estado TEXT NOT NULL DEFAULT 'pendiente',
        creado_en TIMESTAMPTZ NOT NULL DEFAULT now()
    )
    ",
    r"
    CREATE TABLE IF NOT EXISTS rifa_payment_options (
        id BIGSERIAL PRIMARY KEY,
        raffle_id BIGINT NOT NULL REFERENCES rifas(id) ON DELETE CASCADE,
        payment_method_id BIGINT NOT NULL,
        instructions TEXT,
        min_centavos BIGINT,
        max_centavos BIGINT,
        sort_order INTEGER NOT NULL DEFAULT 0,
        is_active BOOLEAN NOT NULL DEFAULT TRUE
    )
    ",
    "CREATE INDEX IF NOT EXISTS idx_payment_options_raffle ON rifa_payment_options(raffle_id, sort_order)",
];
