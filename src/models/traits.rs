use crate::models::common::{Contact, ContactKind, TurnDirection};

/// ホストシミュレーションがエージェントに提供するインターフェース
///
/// 1ティックにつき1回、同期的に呼び出されます。移動系のコマンドは戻り値を持たず、
/// 成否は次ティックのセンサー状態から推定します。
pub trait Environment {
    /// 現ティックのレーダー観測（キャッシュされない）
    fn read_radar(&self) -> Vec<Contact>;

    /// 前方センサーが捉えた最も近い物体の種類
    fn read_forward_sensor(&self) -> ContactKind;

    /// 現在の方位（ラジアン、未正規化の可能性あり）
    fn read_heading(&self) -> f64;

    /// 現在の耐久値
    fn read_health(&self) -> f64;

    fn command_forward(&mut self);

    fn command_backward(&mut self);

    /// 1ステップ分の旋回
    fn command_turn(&mut self, direction: TurnDirection);

    /// 絶対方位に向けて射撃
    fn command_fire(&mut self, bearing: f64);

    /// チーム全体へのベストエフォート送信
    fn broadcast(&mut self, text: &str);

    /// 受信箱の全メッセージを取り出す
    fn drain_inbox(&mut self) -> Vec<String>;
}
