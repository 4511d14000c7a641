/// Idempotent schema creation: every statement is `CREATE ... IF NOT
/// EXISTS`, safe to run on every process startup without a migrations
/// directory.
pub const CREATE_TABLES: &str = r#"
CREATE TABLE IF NOT EXISTS news_items (
    id SERIAL PRIMARY KEY,
    news_id VARCHAR(255) UNIQUE NOT NULL,
    headline TEXT NOT NULL,
    summary TEXT,
    url VARCHAR(500),
    published_at TIMESTAMP WITH TIME ZONE NOT NULL,
    processed_at TIMESTAMP WITH TIME ZONE DEFAULT NOW(),
    significance_score DECIMAL(5,2),
    reasoning TEXT,
    is_significant BOOLEAN DEFAULT FALSE,
    processed_by_block2 BOOLEAN DEFAULT FALSE,
    created_at TIMESTAMP WITH TIME ZONE DEFAULT NOW()
);

CREATE TABLE IF NOT EXISTS trading_signals (
    id SERIAL PRIMARY KEY,
    news_item_id INTEGER REFERENCES news_items(id),
    signal_type VARCHAR(20) NOT NULL CHECK (signal_type IN ('BUY', 'SELL', 'SHORT', 'HOLD')),
    confidence DECIMAL(4,3) NOT NULL CHECK (confidence >= 0 AND confidence <= 1),
    elliott_wave INTEGER NOT NULL CHECK (elliott_wave >= 0 AND elliott_wave <= 6),
    wave_description TEXT NOT NULL,
    reasoning TEXT NOT NULL,
    market_conditions JSONB,
    entry_start TIMESTAMP WITH TIME ZONE NOT NULL,
    entry_end TIMESTAMP WITH TIME ZONE NOT NULL,
    created_at TIMESTAMP WITH TIME ZONE DEFAULT NOW()
);

CREATE TABLE IF NOT EXISTS experiments (
    id SERIAL PRIMARY KEY,
    signal_id INTEGER UNIQUE NOT NULL REFERENCES trading_signals(id),
    news_item_id INTEGER NOT NULL REFERENCES news_items(id),
    ticker VARCHAR(10) NOT NULL,
    direction VARCHAR(20) NOT NULL CHECK (direction IN ('BUY', 'SELL', 'SHORT', 'HOLD')),
    entry_time TIMESTAMP WITH TIME ZONE NOT NULL,
    entry_price DECIMAL(12,4) NOT NULL,
    position_size DECIMAL(12,2) NOT NULL,
    shares DECIMAL(16,6) NOT NULL,
    entry_commission DECIMAL(10,4) NOT NULL,
    stop_loss_price DECIMAL(12,4) NOT NULL,
    take_profit_price DECIMAL(12,4) NOT NULL,
    max_hold_until TIMESTAMP WITH TIME ZONE NOT NULL,
    benchmark_entry_price DECIMAL(12,4),
    exit_time TIMESTAMP WITH TIME ZONE,
    exit_price DECIMAL(12,4),
    exit_reason VARCHAR(50),
    exit_commission DECIMAL(10,4),
    gross_pnl DECIMAL(12,2),
    net_pnl DECIMAL(12,2),
    return_percent DECIMAL(8,4),
    hold_duration_minutes BIGINT,
    benchmark_return_percent DECIMAL(8,4),
    alpha DECIMAL(8,4),
    status VARCHAR(20) NOT NULL DEFAULT 'active' CHECK (status IN ('active', 'closed'))
);

CREATE TABLE IF NOT EXISTS portfolio_snapshots (
    id SERIAL PRIMARY KEY,
    timestamp TIMESTAMP WITH TIME ZONE UNIQUE NOT NULL DEFAULT NOW(),
    total_value DECIMAL(14,2) NOT NULL,
    cash_balance DECIMAL(14,2) NOT NULL,
    positions_count INTEGER DEFAULT 0,
    unrealized_pnl DECIMAL(12,2) DEFAULT 0,
    realized_pnl_today DECIMAL(12,2) DEFAULT 0,
    realized_pnl_total DECIMAL(12,2) DEFAULT 0,
    daily_return DECIMAL(8,4) DEFAULT 0,
    total_return DECIMAL(8,4) DEFAULT 0
);

CREATE TABLE IF NOT EXISTS service_logs (
    id SERIAL PRIMARY KEY,
    timestamp TIMESTAMP WITH TIME ZONE DEFAULT NOW(),
    level VARCHAR(10) NOT NULL,
    message TEXT NOT NULL,
    service VARCHAR(50) NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_news_items_news_id ON news_items(news_id);
CREATE INDEX IF NOT EXISTS idx_news_items_is_significant ON news_items(is_significant);
CREATE INDEX IF NOT EXISTS idx_news_items_processed_by_block2 ON news_items(processed_by_block2);
CREATE INDEX IF NOT EXISTS idx_trading_signals_news_item_id ON trading_signals(news_item_id);
CREATE INDEX IF NOT EXISTS idx_experiments_status ON experiments(status);
CREATE INDEX IF NOT EXISTS idx_portfolio_snapshots_timestamp ON portfolio_snapshots(timestamp);
"#;

pub const CREATE_NOTIFY_FUNCTIONS: &str = r#"
CREATE OR REPLACE FUNCTION notify_new_significant_news()
RETURNS TRIGGER AS $$
BEGIN
    IF NEW.is_significant = TRUE THEN
        PERFORM pg_notify('new_significant_news', NEW.id::text);
    END IF;
    RETURN NEW;
END;
$$ LANGUAGE plpgsql;

CREATE OR REPLACE FUNCTION notify_new_trading_signal()
RETURNS TRIGGER AS $$
BEGIN
    PERFORM pg_notify('new_trading_signals', NEW.id::text);
    RETURN NEW;
END;
$$ LANGUAGE plpgsql;

DROP TRIGGER IF EXISTS trigger_notify_significant_news ON news_items;
CREATE TRIGGER trigger_notify_significant_news
    AFTER INSERT OR UPDATE ON news_items
    FOR EACH ROW
    EXECUTE FUNCTION notify_new_significant_news();

DROP TRIGGER IF EXISTS trigger_notify_new_signal ON trading_signals;
CREATE TRIGGER trigger_notify_new_signal
    AFTER INSERT ON trading_signals
    FOR EACH ROW
    EXECUTE FUNCTION notify_new_trading_signal();
"#;
